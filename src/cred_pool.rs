//! Credential-session pool and the in-process user table it guards. A fixed-size pool of
//! pre-opened sessions with a mutex-guarded idle list and a condvar tracking idle count;
//! "session" here is a handle onto an in-process `username -> password` table rather than a
//! live database connection, modeling the scoped-acquisition contention without real DB I/O.

use std::collections::HashMap;
use std::fs;
use std::sync::{Condvar, Mutex};

/// A pre-opened handle. The original pool hands out `MYSQL*` connections; this hands out an
/// index into `CredentialPool::sessions`, each backed by the same shared user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(pub usize);

struct Shared {
    idle: Vec<SessionId>,
    users: HashMap<String, String>,
}

pub struct CredentialPool {
    shared: Mutex<Shared>,
    available: Condvar,
    capacity: usize,
}

#[derive(Debug)]
pub struct InitError;

impl CredentialPool {
    /// Opens `capacity` sessions against the user table loaded from `users_file` (one
    /// `username:password` pair per line). A missing or empty seed file still counts as a
    /// successfully opened table; only `capacity == 0` is fatal.
    pub fn init(capacity: usize, users_file: &str) -> Result<Self, InitError> {
        let users = load_users(users_file);
        if capacity == 0 {
            proxy_log::erro!("credential pool: capacity 0, all sessions failed to initialise");
            return Err(InitError);
        }

        let idle = (0..capacity).map(SessionId).collect();
        Ok(Self {
            shared: Mutex::new(Shared { idle, users }),
            available: Condvar::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks on the idle-count semaphore (modeled as a condvar over the guarded idle list);
    /// returns a scoped guard that releases on every exit path, including unwind.
    pub fn acquire(&self) -> ScopedSession<'_> {
        let mut shared = self.shared.lock().unwrap();
        loop {
            if let Some(id) = shared.idle.pop() {
                return ScopedSession { pool: self, id: Some(id) };
            }
            shared = self.available.wait(shared).unwrap();
        }
    }

    fn release(&self, id: SessionId) {
        let mut shared = self.shared.lock().unwrap();
        shared.idle.push(id);
        self.available.notify_one();
    }

    fn lookup(&self, username: &str) -> Option<String> {
        self.shared.lock().unwrap().users.get(username).cloned()
    }

    /// Guarded by the same mutex as the idle-list bookkeeping.
    fn register(&self, username: &str, password: &str) -> bool {
        let mut shared = self.shared.lock().unwrap();
        if shared.users.contains_key(username) {
            return false;
        }
        shared.users.insert(username.to_string(), password.to_string());
        true
    }

    pub fn destroy_all(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.idle.clear();
    }
}

fn load_users(path: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    match fs::read_to_string(path) {
        Ok(contents) => {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some((user, pass)) = line.split_once(':') {
                    map.insert(user.to_string(), pass.to_string());
                }
            }
        }
        Err(e) => proxy_log::warn!("credential pool: could not read users file `{}`: {}", path, e),
    }
    map
}

/// RAII guard: acquires on construction (`CredentialPool::acquire`), releases via `Drop` on
/// every exit path including unwind.
pub struct ScopedSession<'a> {
    pool: &'a CredentialPool,
    id: Option<SessionId>,
}

impl<'a> ScopedSession<'a> {
    pub fn id(&self) -> SessionId {
        self.id.expect("session released before use")
    }

    pub fn login(&self, username: &str, password: &str) -> bool {
        self.pool.lookup(username).as_deref() == Some(password)
    }

    pub fn register_user(&self, username: &str, password: &str) -> bool {
        self.pool.register(username, password)
    }
}

impl Drop for ScopedSession<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.pool.release(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TempUsersFile(std::path::PathBuf);

    impl Drop for TempUsersFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    fn pool_with_users(pairs: &[(&str, &str)]) -> (TempUsersFile, CredentialPool) {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("server_proxy_cred_pool_test_{}_{}.txt", std::process::id(), n));
        let body: String = pairs.iter().map(|(u, p)| format!("{}:{}\n", u, p)).collect();
        fs::write(&path, body).unwrap();
        let pool = CredentialPool::init(4, path.to_str().unwrap()).unwrap();
        (TempUsersFile(path), pool)
    }

    #[test]
    fn login_succeeds_for_known_user() {
        let (_f, pool) = pool_with_users(&[("alice", "secret")]);
        let s = pool.acquire();
        assert!(s.login("alice", "secret"));
        assert!(!s.login("alice", "wrong"));
        assert!(!s.login("bob", "secret"));
    }

    #[test]
    fn register_rejects_existing_user() {
        let (_f, pool) = pool_with_users(&[("alice", "secret")]);
        let s = pool.acquire();
        assert!(!s.register_user("alice", "anything"));
        assert!(s.register_user("carol", "newpass"));
        assert!(s.login("carol", "newpass"));
    }

    #[test]
    fn session_returns_to_pool_on_drop() {
        let (_f, pool) = pool_with_users(&[]);
        assert_eq!(pool.capacity(), 4);
        {
            let _s1 = pool.acquire();
            let _s2 = pool.acquire();
        }
        // Both sessions released; pool should still hand out up to capacity again.
        let _s3 = pool.acquire();
        let _s4 = pool.acquire();
        let _s5 = pool.acquire();
        let _s6 = pool.acquire();
    }

    #[test]
    fn init_with_zero_capacity_is_fatal() {
        assert!(CredentialPool::init(0, "/nonexistent").is_err());
    }

    #[test]
    fn missing_users_file_is_not_fatal() {
        let pool = CredentialPool::init(2, "/path/does/not/exist.txt").unwrap();
        let s = pool.acquire();
        assert!(!s.login("anyone", "anything"));
    }
}
