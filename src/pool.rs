//! A key→`Connection` map protected by a reader/writer lock, with broadcast.
//!
//! A connection may belong to multiple pools; each pool is given a weak
//! back-reference slot on every member connection (`Connection::record_membership`)
//! so that closing a connection symmetrically removes it from every pool it
//! joined, without the pool and the connection holding strong references to
//! each other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use crate::buffer::Buffer;
use crate::connection::{Connection, PoolMembership};
use crate::error::Error;

struct Inner {
    members: RwLock<HashMap<String, Arc<Connection>>>,
}

impl PoolMembership for Inner {
    fn forget_member(&self, key: &str) {
        self.members.write().expect("pool lock poisoned").remove(key);
    }
}

/// A `key -> Connection` map with broadcast.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl ConnectionPool {
    /// `capacity_hint` pre-sizes the underlying map; it is not a limit.
    pub fn new(capacity_hint: usize) -> ConnectionPool {
        ConnectionPool {
            inner: Arc::new(Inner { members: RwLock::new(HashMap::with_capacity(capacity_hint)) }),
        }
    }

    /// Add a connection to the pool. Fails with [`Error::AlreadyMember`] if
    /// it is already present.
    pub fn add(&self, conn: Arc<Connection>) -> Result<(), Error> {
        let key = conn.id();
        {
            let mut members = self.inner.members.write().expect("pool lock poisoned");
            if members.contains_key(&key) {
                return Err(Error::AlreadyMember);
            }
            members.insert(key.clone(), conn.clone());
        }
        let weak: Weak<dyn PoolMembership> = Arc::downgrade(&self.inner);
        conn.record_membership(key, weak);
        log::debug!(target: "threadnet::pool", "connection joined pool");
        Ok(())
    }

    /// Remove a connection from the pool, symmetrically clearing its
    /// back-reference. Fails with [`Error::NotMember`] if it was not present.
    pub fn remove(&self, conn: &Connection) -> Result<(), Error> {
        let key = conn.id();
        let removed = self.inner.members.write().expect("pool lock poisoned").remove(&key);
        if removed.is_none() {
            return Err(Error::NotMember);
        }
        conn.forget_membership(&key);
        Ok(())
    }

    /// Fan the same encoded message out to every current member, cloning the
    /// buffer per recipient; skip `originator` if given. Takes the pool lock
    /// in read mode only; per-connection send-queue locking is independent,
    /// so broadcast never blocks on a per-connection send path while holding
    /// the pool lock.
    pub fn broadcast(&self, originator: Option<&Connection>, message: &Buffer) {
        let originator_key = originator.map(Connection::id);
        let members = self.inner.members.read().expect("pool lock poisoned");
        for (key, conn) in members.iter() {
            if Some(key.as_str()) == originator_key.as_deref() {
                continue;
            }
            if let Err(e) = conn.enqueue_send(message.clone()) {
                log::warn!(target: "threadnet::pool", "broadcast enqueue failed for {key}: {e}");
            }
        }
    }

    /// Current member count (read lock).
    pub fn size(&self) -> usize {
        self.inner.members.read().expect("pool lock poisoned").len()
    }

    /// Close every remaining member as a safety net, then empty the pool.
    pub fn destroy(&self) {
        let members = std::mem::take(&mut *self.inner.members.write().expect("pool lock poisoned"));
        for (key, conn) in members {
            conn.forget_membership(&key);
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnState, Role, Tunables};
    use std::net::{TcpListener, TcpStream};

    fn fake_connection() -> Arc<Connection> {
        // A connected loopback pair, wrapped as a `ServerAccepted` connection,
        // used purely to exercise pool bookkeeping (no engine is started).
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        let _ = client;
        let local = server.local_addr().unwrap();
        let peer = server.peer_addr().unwrap();
        Arc::new(
            Connection::new(Some(server), None, local, Some(peer), Role::ServerAccepted, true, None, None, Tunables::default())
                .unwrap(),
        )
    }

    #[test]
    fn add_remove_and_size() {
        let pool = ConnectionPool::new(4);
        let c1 = fake_connection();
        pool.add(c1.clone()).unwrap();
        assert_eq!(pool.size(), 1);
        assert!(matches!(pool.add(c1.clone()), Err(Error::AlreadyMember)));
        pool.remove(&c1).unwrap();
        assert_eq!(pool.size(), 0);
        assert!(matches!(pool.remove(&c1), Err(Error::NotMember)));
    }

    #[test]
    fn broadcast_skips_originator() {
        let pool = ConnectionPool::new(4);
        let c1 = fake_connection();
        let c2 = fake_connection();
        let c3 = fake_connection();
        pool.add(c1.clone()).unwrap();
        pool.add(c2.clone()).unwrap();
        pool.add(c3.clone()).unwrap();

        pool.broadcast(Some(&c1), &Buffer::from("hi"));

        assert_eq!(c1.queue_depths().0, 0);
        assert_eq!(c2.queue_depths().0, 1);
        assert_eq!(c3.queue_depths().0, 1);
    }

    #[test]
    fn close_symmetrically_leaves_every_joined_pool() {
        let pool_a = ConnectionPool::new(1);
        let pool_b = ConnectionPool::new(1);
        let c1 = fake_connection();
        pool_a.add(c1.clone()).unwrap();
        pool_b.add(c1.clone()).unwrap();
        assert_eq!(pool_a.size(), 1);
        assert_eq!(pool_b.size(), 1);

        c1.close();
        assert_eq!(c1.state(), ConnState::Run); // close() does not change app-level state
        assert_eq!(pool_a.size(), 0);
        assert_eq!(pool_b.size(), 0);
    }
}
