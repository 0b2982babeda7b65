//! End-to-end test over a real socket: two viewers drive client
//! synchronizers against a running server.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use watchparty_core::{
    Action, ClientMessage, ClientState, ClientSynchronizer, MemoryStore, Reaction, ServerMessage,
    SessionRepository, SystemClock,
};
use watchparty_sync_server::api::{build_router, AppState};
use watchparty_sync_server::config::Config;
use watchparty_sync_server::engine::{EngineHandle, SyncEngine};
use watchparty_sync_server::metrics::Metrics;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (String, EngineHandle) {
    let metrics = Arc::new(Metrics::new());
    let repository = SessionRepository::new(Arc::new(MemoryStore::new()));
    let (engine, _task) =
        SyncEngine::new(repository, Arc::new(SystemClock), metrics.clone()).spawn(64);
    let router = build_router(AppState::new(
        engine.clone(),
        Arc::new(Config::default()),
        metrics,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("ws://{}/ws", addr), engine)
}

async fn send(socket: &mut Socket, message: ClientMessage) {
    socket
        .send(Message::Text(message.to_json().unwrap()))
        .await
        .unwrap();
}

async fn receive(socket: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::parse(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_two_viewers_stay_in_sync() {
    let (url, engine) = start_server().await;
    engine
        .create_session("movie", "https://youtu.be/abc")
        .await
        .unwrap();

    let (mut socket_a, _) = connect_async(url.as_str()).await.unwrap();
    let (mut socket_b, _) = connect_async(url.as_str()).await.unwrap();
    let mut viewer_a = ClientSynchronizer::new("movie");
    let mut viewer_b = ClientSynchronizer::new("movie");

    // A joins a fresh session and is told to rewind to zero.
    send(&mut socket_a, viewer_a.join(3.0).unwrap()).await;
    let reply = receive(&mut socket_a).await;
    assert_eq!(
        viewer_a.on_server_message(&reply, 3.0),
        Reaction::Applied { seek_to: Some(0.0) }
    );
    assert_eq!(viewer_a.state(), ClientState::AwaitingReady);

    send(&mut socket_b, viewer_b.join(0.0).unwrap()).await;
    let reply = receive(&mut socket_b).await;
    viewer_b.on_server_message(&reply, 0.0);
    assert_ne!(viewer_a.handle(), viewer_b.handle());

    // A presses play at 42s.
    send(&mut socket_a, viewer_a.on_play(42.0).unwrap()).await;

    let echo = receive(&mut socket_a).await;
    assert_eq!(viewer_a.on_server_message(&echo, 42.0), Reaction::Ignored);

    let update = receive(&mut socket_b).await;
    match &update {
        ServerMessage::Sync(sync) => assert_eq!(sync.action, Action::Play),
        other => panic!("expected PLAY broadcast, got {:?}", other),
    }
    assert_eq!(
        viewer_b.on_server_message(&update, 0.0),
        Reaction::Applied { seek_to: Some(42.0) }
    );
    assert!(viewer_b.should_play());

    let session = engine.get_session("movie").await.unwrap();
    assert!(session.is_playing);
    assert!(session.position_at(chrono::Utc::now()) >= 42.0);
}

#[tokio::test]
async fn test_unknown_session_error_over_socket() {
    let (url, engine) = start_server().await;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    let mut viewer = ClientSynchronizer::new("ghost");

    send(&mut socket, viewer.join(0.0).unwrap()).await;
    let reply = receive(&mut socket).await;

    assert!(matches!(
        viewer.on_server_message(&reply, 0.0),
        Reaction::Rejected { ref error, .. } if error == "session_not_found"
    ));
    assert_eq!(viewer.state(), ClientState::NotJoined);

    // The connection survives the error and a malformed frame.
    socket.send(Message::Text("garbage".to_string())).await.unwrap();
    engine
        .create_session("ghost", "https://youtu.be/late")
        .await
        .unwrap();
    send(&mut socket, viewer.join(0.0).unwrap()).await;
    let reply = receive(&mut socket).await;
    assert_eq!(
        viewer.on_server_message(&reply, 0.0),
        Reaction::Applied { seek_to: Some(0.0) }
    );
}
