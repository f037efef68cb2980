//! Reference client: connect, send an ident request, print the reply, then
//! quit. Flag parsing is deliberately minimal.

use std::env;
use std::time::Duration;

use threadnet::connection::socket::connect;
use threadnet::connection::{ConnectOptions, IpVersion};
use threadnet::messages::{self, Ident};

fn main() {
    env_logger::init();
    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(9000);
    let name = args.next().unwrap_or_else(|| "guest".to_string());

    let conn = connect(&host, port, IpVersion::Any, ConnectOptions::default()).expect("connect failed");
    conn.start_engine().expect("failed to start engine");

    let ident = Ident { id: 0, name, password: String::new() };
    conn.enqueue_send(ident.encode(messages::TYPE_IDENT_REQUEST)).expect("send failed");

    match conn.wait_receive(Duration::from_millis(20), Duration::from_secs(5)) {
        Some(frame) => {
            let mut decoded = threadnet::codec::decode(&frame).expect("malformed reply");
            let type_tag = decoded.pop_int().expect("missing type tag");
            if type_tag == messages::TYPE_IDENT_REPLY_OK {
                let reply = Ident::decode(&mut decoded).expect("malformed ident reply");
                println!("ident accepted: id={}", reply.id);
            } else if type_tag == messages::TYPE_IDENT_REPLY_NOK {
                println!("ident rejected");
            } else {
                println!("unexpected reply type {type_tag}");
            }
        }
        None => println!("no reply within timeout"),
    }

    let _ = conn.enqueue_send(messages::encode_quit());
    conn.wait_close();
}
