//! Reference accept-loop composition: a worker pool sized to available
//! cores, a listener, and a `Direct` job per accepted connection that starts
//! the connection's engine and runs a small ident/chat/quit handler. Not
//! part of the library's public contract; flag parsing is deliberately
//! minimal.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use threadnet::connection::socket::{accept, listen};
use threadnet::connection::{AcceptMode, ConnState, ConnectOptions, Connection, IpVersion};
use threadnet::messages::{self, ChatString, Ident};
use threadnet::workers::{SubmitMode, WorkerPool};

fn handle_connection(conn: Arc<Connection>) {
    if let Err(e) = conn.start_engine() {
        log::warn!("failed to start engine for {:?}: {e}", conn.remote_addr());
        return;
    }

    loop {
        let frame = match conn.wait_receive(Duration::from_millis(20), Duration::from_secs(60)) {
            Some(frame) => frame,
            None => {
                if conn.state() != ConnState::Run {
                    break;
                }
                continue;
            }
        };

        let type_tag = match threadnet::codec::peek_first_int(&frame) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("dropping malformed frame: {e}");
                continue;
            }
        };

        let mut decoded = match threadnet::codec::decode(&frame) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("decode failed: {e}");
                continue;
            }
        };
        let _ = decoded.pop_int(); // consume the type tag already peeked

        match type_tag {
            t if t == messages::TYPE_IDENT_REQUEST => match Ident::decode(&mut decoded) {
                Ok(ident) => {
                    log::info!("ident request from '{}'", ident.name);
                    let reply = ident.encode(messages::TYPE_IDENT_REPLY_OK);
                    let _ = conn.enqueue_send(reply);
                }
                Err(e) => log::warn!("bad ident payload: {e}"),
            },
            t if t == messages::TYPE_CHAT_STRING => match ChatString::decode(&mut decoded) {
                Ok(chat) => log::info!("chat from {}: {}", chat.id_from, chat.text),
                Err(e) => log::warn!("bad chat payload: {e}"),
            },
            t if t == messages::TYPE_QUIT => {
                conn.set_state(ConnState::ExitAsked);
                break;
            }
            other => log::debug!("ignoring message type {other}"),
        }
    }

    conn.wait_close();
}

fn main() {
    env_logger::init();
    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "0.0.0.0".to_string());
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(9000);

    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) * 2;
    let pool = WorkerPool::new(worker_count, Some(64)).expect("failed to create worker pool");

    let listener = listen(Some(&host), port, 128, IpVersion::Any).expect("listen failed");
    log::info!("listening on {host}:{port}");

    loop {
        match accept(&listener, ConnectOptions::default(), AcceptMode::Timeout(Duration::from_millis(500))) {
            Ok(Some(conn)) => {
                log::info!("accepted {:?}", conn.remote_addr());
                let job: Box<dyn FnOnce(Box<dyn std::any::Any + Send>) + Send> =
                    Box::new(move |_arg| handle_connection(conn));
                if let Err(e) = pool.submit(job, Box::new(()), SubmitMode::Direct, None) {
                    log::warn!("worker pool rejected connection job: {e}");
                }
            }
            Ok(None) => continue,
            Err(e) => {
                log::error!("accept failed: {e}");
                break;
            }
        }
    }

    pool.wait_all(Duration::from_millis(50));
    pool.destroy(Duration::from_millis(50));
}
