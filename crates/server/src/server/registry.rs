//! Connection registry: membership, capacity cap, the admin slot and fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use protocol::Role;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::connection::{ConnectionHandle, ConnectionId};

/// Registry refusals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry full ({0} connections)")]
    Capacity(usize),
    #[error("name {0:?} already in use")]
    NameInUse(String),
    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),
}

/// One registered connection and what the auth gate decided about it.
#[derive(Debug, Clone)]
pub struct Member {
    pub handle: Arc<ConnectionHandle>,
    /// `None` until the handshake succeeds.
    pub role: Option<Role>,
    pub name: Option<String>,
}

#[derive(Debug, Default)]
struct Members {
    entries: HashMap<ConnectionId, Member>,
    /// Holder of admin rights; always a key of `entries`.
    admin: Option<ConnectionId>,
}

/// Active connections, bounded by a capacity cap.
#[derive(Debug)]
pub struct Registry {
    capacity: usize,
    next_id: AtomicU64,
    members: Mutex<Members>,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, next_id: AtomicU64::new(1), members: Mutex::new(Members::default()) }
    }

    /// Allocate a fresh connection id.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a pending (not yet authenticated) connection.
    pub async fn register(&self, handle: Arc<ConnectionHandle>) -> Result<(), RegistryError> {
        let mut members = self.members.lock().await;
        if members.entries.len() >= self.capacity {
            return Err(RegistryError::Capacity(self.capacity));
        }
        members.entries.insert(handle.id, Member { handle, role: None, name: None });
        Ok(())
    }

    /// Remove a connection, clearing the admin slot if it held it.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Member> {
        let mut members = self.members.lock().await;
        if members.admin == Some(id) {
            members.admin = None;
        }
        members.entries.remove(&id)
    }

    /// Record the outcome of a successful handshake.
    ///
    /// The name must not be held by any other connection, except the current
    /// admin when `role` is `Admin`, since that holder is about to be
    /// replaced. Granting `Admin` installs `id` in the admin slot and returns
    /// the previous holder, already demoted and removed from the slot, so the
    /// caller can notify and close it.
    pub async fn assign_role(
        &self,
        id: ConnectionId,
        role: Role,
        name: &str,
    ) -> Result<Option<Member>, RegistryError> {
        let mut members = self.members.lock().await;
        let replaced = match role {
            Role::Admin => members.admin.filter(|&admin| admin != id),
            Role::Observer => None,
        };

        let taken = members.entries.values().any(|m| {
            m.handle.id != id && Some(m.handle.id) != replaced && m.name.as_deref() == Some(name)
        });
        if taken {
            return Err(RegistryError::NameInUse(name.to_string()));
        }

        let member = members.entries.get_mut(&id).ok_or(RegistryError::NotRegistered(id))?;
        member.role = Some(role);
        member.name = Some(name.to_string());

        if role != Role::Admin {
            return Ok(None);
        }

        members.admin = Some(id);
        let evicted = replaced.and_then(|old| {
            let prior = members.entries.get_mut(&old)?;
            prior.role = Some(Role::Observer);
            Some(prior.clone())
        });
        Ok(evicted)
    }

    /// Push an event line, identical for every connection.
    pub async fn broadcast_event(&self, line: &str) -> usize {
        self.fan_out(|_| line.to_string()).await
    }

    /// Push a telemetry frame rendered for each recipient's role.
    pub async fn broadcast_telemetry(&self, render: impl FnMut(Option<Role>) -> String) -> usize {
        self.fan_out(render).await
    }

    /// The registry lock is held for the whole pass. A failed send does not
    /// abort the pass: the connection is closed after the pass and left for
    /// its own task to unregister.
    async fn fan_out(&self, mut render: impl FnMut(Option<Role>) -> String) -> usize {
        let members = self.members.lock().await;
        let mut delivered = 0;
        let mut failed = Vec::new();

        for member in members.entries.values() {
            if member.handle.is_closed() {
                continue;
            }
            let line = render(member.role);
            match member.handle.send_line(line) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to send to {} ({}): {}",
                        member.handle.id, member.handle.addr, e
                    );
                    failed.push(Arc::clone(&member.handle));
                }
            }
        }

        for handle in failed {
            handle.close();
        }
        debug!("Broadcast delivered to {} connection(s)", delivered);
        delivered
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current admin, if any.
    pub async fn admin(&self) -> Option<ConnectionId> {
        self.members.lock().await.admin
    }

    pub async fn member(&self, id: ConnectionId) -> Option<Member> {
        self.members.lock().await.entries.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_connection_with_rx(registry: &Registry) -> (Arc<ConnectionHandle>, mpsc::Receiver<String>) {
        ConnectionHandle::new(registry.next_id(), "127.0.0.1:7000".parse().unwrap(), 8)
    }

    #[tokio::test]
    async fn register_respects_capacity() {
        let registry = Registry::new(2);
        let (a, _ra) = make_connection_with_rx(&registry);
        let (b, _rb) = make_connection_with_rx(&registry);
        let (c, _rc) = make_connection_with_rx(&registry);
        registry.register(a).await.unwrap();
        registry.register(b).await.unwrap();
        assert_eq!(registry.register(c).await, Err(RegistryError::Capacity(2)));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn unregister_frees_a_slot() {
        let registry = Registry::new(1);
        let (a, _ra) = make_connection_with_rx(&registry);
        let (b, _rb) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&a)).await.unwrap();
        assert!(registry.unregister(a.id).await.is_some());
        assert!(registry.is_empty().await);
        registry.register(b).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let registry = Registry::new(4);
        let (a, _ra) = make_connection_with_rx(&registry);
        let (b, _rb) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&a)).await.unwrap();
        registry.register(Arc::clone(&b)).await.unwrap();

        registry.assign_role(a.id, Role::Observer, "ana").await.unwrap();
        assert!(matches!(
            registry.assign_role(b.id, Role::Observer, "ana").await,
            Err(RegistryError::NameInUse(name)) if name == "ana"
        ));
        assert_eq!(registry.member(b.id).await.unwrap().role, None);
    }

    #[tokio::test]
    async fn second_admin_evicts_first() {
        let registry = Registry::new(4);
        let (a, _ra) = make_connection_with_rx(&registry);
        let (b, _rb) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&a)).await.unwrap();
        registry.register(Arc::clone(&b)).await.unwrap();

        assert!(registry.assign_role(a.id, Role::Admin, "root").await.unwrap().is_none());
        assert_eq!(registry.admin().await, Some(a.id));

        // Same user name is allowed because the holder is being replaced.
        let evicted = registry.assign_role(b.id, Role::Admin, "root").await.unwrap().unwrap();
        assert_eq!(evicted.handle.id, a.id);
        assert_eq!(evicted.role, Some(Role::Observer));
        assert_eq!(registry.admin().await, Some(b.id));
    }

    #[tokio::test]
    async fn evicted_member_keeps_its_own_name() {
        let registry = Registry::new(4);
        let (a, _ra) = make_connection_with_rx(&registry);
        let (b, _rb) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&a)).await.unwrap();
        registry.register(Arc::clone(&b)).await.unwrap();

        registry.assign_role(a.id, Role::Admin, "root").await.unwrap();
        let evicted = registry.assign_role(b.id, Role::Admin, "ops").await.unwrap().unwrap();
        assert_eq!(evicted.name.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn unregister_only_clears_own_admin_slot() {
        let registry = Registry::new(4);
        let (a, _ra) = make_connection_with_rx(&registry);
        let (b, _rb) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&a)).await.unwrap();
        registry.register(Arc::clone(&b)).await.unwrap();
        registry.assign_role(a.id, Role::Admin, "root").await.unwrap();
        registry.assign_role(b.id, Role::Admin, "root").await.unwrap();

        // The evicted admin tearing down must not clear the new holder.
        registry.unregister(a.id).await;
        assert_eq!(registry.admin().await, Some(b.id));
        registry.unregister(b.id).await;
        assert_eq!(registry.admin().await, None);
    }

    #[tokio::test]
    async fn broadcast_event_reaches_everyone() {
        let registry = Registry::new(4);
        let (a, mut ra) = make_connection_with_rx(&registry);
        let (b, mut rb) = make_connection_with_rx(&registry);
        registry.register(a).await.unwrap();
        registry.register(b).await.unwrap();

        assert_eq!(registry.broadcast_event("hola").await, 2);
        assert_eq!(ra.try_recv().unwrap(), "hola");
        assert_eq!(rb.try_recv().unwrap(), "hola");
    }

    #[tokio::test]
    async fn broadcast_renders_per_role() {
        let registry = Registry::new(4);
        let (a, mut ra) = make_connection_with_rx(&registry);
        let (b, mut rb) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&a)).await.unwrap();
        registry.register(Arc::clone(&b)).await.unwrap();
        registry.assign_role(a.id, Role::Admin, "root").await.unwrap();
        registry.assign_role(b.id, Role::Observer, "ana").await.unwrap();

        registry
            .broadcast_telemetry(|role| match role {
                Some(Role::Admin) => "admin".to_string(),
                _ => "observer".to_string(),
            })
            .await;
        assert_eq!(ra.try_recv().unwrap(), "admin");
        assert_eq!(rb.try_recv().unwrap(), "observer");
    }

    #[tokio::test]
    async fn failed_send_closes_only_that_connection() {
        let registry = Registry::new(4);
        let (slow, _slow_rx) = ConnectionHandle::new(registry.next_id(), "127.0.0.1:7001".parse().unwrap(), 1);
        let (ok, mut ok_rx) = make_connection_with_rx(&registry);
        registry.register(Arc::clone(&slow)).await.unwrap();
        registry.register(Arc::clone(&ok)).await.unwrap();

        assert_eq!(registry.broadcast_event("1").await, 2);
        // The slow connection's one-line queue is now full.
        assert_eq!(registry.broadcast_event("2").await, 1);
        assert!(slow.is_closed());
        assert!(!ok.is_closed());
        assert_eq!(ok_rx.try_recv().unwrap(), "1");
        assert_eq!(ok_rx.try_recv().unwrap(), "2");
    }
}
