use std::sync::Arc;
use std::time::Duration;

use meterread::transport::sim::SimulatedConnector;
use meterread::{Event, SessionConfig, StreamSession};

#[tokio::main]
pub async fn main(){
    let (sink, mut events) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let sink = Arc::new(sink);
    loop {
        let session = StreamSession::new(
            SimulatedConnector::default(),
            "UM24C".into(),
            sink.clone(),
            SessionConfig::default(),
        );
        session.retrieve_data().await.unwrap();
        session.closed().await;
        while let Ok(event) = events.try_recv() {
            println!("{}: {:?}", event.kind(), event.fields());
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
