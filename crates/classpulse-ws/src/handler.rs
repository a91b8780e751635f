use axum::extract::ws::{Message, WebSocket};
use classpulse_core::events::{HubEvent, Role};
use classpulse_core::{hub, AppState};
use classpulse_models::{ClientEvent, ServerEventKind};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-connection state, established by the first join event.
struct Connection {
    role: Role,
    /// Session id for student channels; teacher channels have none.
    session_id: Option<String>,
    student_name: Option<String>,
}

/// One task per connected client. Inbound events are translated to hub
/// calls; everything outbound flows through the event bus, so a single
/// pump task owns the sink.
pub(crate) async fn handle_connection(socket: WebSocket, state: AppState) {
    let channel_id = Uuid::new_v4().to_string();
    tracing::debug!(channel_id, "client connected");

    let (sink, mut stream) = socket.split();
    let mut sink = Some(sink);
    let mut connection: Option<Connection> = None;
    let mut pump: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(channel_id, error = %e, "dropping unparseable client event");
                state.event_bus.publish_channel(
                    &channel_id,
                    ServerEventKind::Error,
                    json!({ "message": "Unrecognized event" }),
                );
                continue;
            }
        };

        match event {
            ClientEvent::TeacherJoin => {
                if matches!(connection.as_ref().map(|c| c.role), Some(Role::Student)) {
                    state.event_bus.publish_channel(
                        &channel_id,
                        ServerEventKind::Error,
                        json!({ "message": "This channel already joined as a student" }),
                    );
                    continue;
                }
                if connection.is_none() {
                    let rx = state
                        .event_bus
                        .register_channel(&channel_id, Role::Teacher, None);
                    pump = sink.take().map(|sink| tokio::spawn(pump_events(rx, sink)));
                    connection = Some(Connection {
                        role: Role::Teacher,
                        session_id: None,
                        student_name: None,
                    });
                    tracing::info!(channel_id, "teacher joined");
                }
                hub::teacher_join(&state, &channel_id).await;
            }
            ClientEvent::StudentJoin { session_id, name } => {
                if matches!(connection.as_ref().map(|c| c.role), Some(Role::Teacher)) {
                    state.event_bus.publish_channel(
                        &channel_id,
                        ServerEventKind::Error,
                        json!({ "message": "This channel already joined as the teacher" }),
                    );
                    continue;
                }
                if connection.is_none() {
                    let rx = state.event_bus.register_channel(
                        &channel_id,
                        Role::Student,
                        Some(session_id.clone()),
                    );
                    pump = sink.take().map(|sink| tokio::spawn(pump_events(rx, sink)));
                    connection = Some(Connection {
                        role: Role::Student,
                        session_id: Some(session_id.clone()),
                        student_name: Some(name.clone()),
                    });
                }
                hub::student_join(&state, &channel_id, &session_id, &name).await;
            }
            ClientEvent::CreatePoll {
                question,
                options,
                time_limit,
            } => {
                if !matches!(
                    connection.as_ref().map(|c| c.role),
                    Some(Role::Teacher)
                ) {
                    state.event_bus.publish_channel(
                        &channel_id,
                        ServerEventKind::Error,
                        json!({ "message": "Only the teacher can create polls" }),
                    );
                    continue;
                }
                if let Err(e) = hub::create_poll(&state, &question, &options, time_limit).await {
                    tracing::warn!(channel_id, error = %e, "poll creation failed");
                    state.event_bus.publish_channel(
                        &channel_id,
                        ServerEventKind::Error,
                        json!({ "message": e.to_string() }),
                    );
                }
            }
            ClientEvent::SubmitVote { poll_id, option_id } => {
                let Some(conn) = connection.as_ref() else {
                    continue;
                };
                let (Some(session_id), Some(name)) =
                    (conn.session_id.as_deref(), conn.student_name.as_deref())
                else {
                    state.event_bus.publish_channel(
                        &channel_id,
                        ServerEventKind::VoteRejected,
                        json!({ "message": "Join as a student before voting" }),
                    );
                    continue;
                };
                // Rejections are published to the voter by the hub; the
                // error itself needs no further handling here.
                let _ = hub::submit_vote(
                    &state, &channel_id, session_id, name, &poll_id, &option_id,
                )
                .await;
            }
        }
    }

    let session_id = connection.as_ref().and_then(|c| c.session_id.clone());
    state.event_bus.unregister_channel(&channel_id);
    hub::disconnect(&state, &channel_id, session_id.as_deref()).await;
    if let Some(pump) = pump {
        // Unregistering dropped the sender; the pump drains and exits.
        let _ = pump.await;
    }
    tracing::debug!(channel_id, "client disconnected");
}

/// Forward bus events to the socket until the subscription closes.
async fn pump_events(
    mut rx: broadcast::Receiver<HubEvent>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let frame = json!({
                    "type": event.kind.as_str(),
                    "data": event.payload,
                });
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Best-effort delivery; clients treat pushes as snapshots.
                tracing::warn!(skipped, "slow websocket client dropped events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = sink.close().await;
}
