//! The reactor: one `mio::Poll` loop multiplexing the listener, the signal pipe, and every
//! client socket. A connection is deregistered the instant an event claims it and only
//! reregistered once the reactor or a worker reports back, so it's never sitting in two
//! places at once.

use crate::completion::{self, Completion, CompletionReceiver};
use crate::cred_pool::CredentialPool;
use crate::http::http_connection::{ActiveAction, HttpConnection, ReadOutcome, WriteOutcome};
use crate::prelude::*;
use crate::process_config::{DispatchMode, ProcessConfig, Trigger};
use crate::timer_list::{TimerKey, TimerList};
use crate::worker_pool::{Op, WorkItem, WorkerPool};
use signal_hook::consts::SIGTERM;
use signal_hook_mio::v1_0::Signals;
use socket2::SockRef;
use std::io;

const LISTEN_TOKEN: Token = Token(0);
const SIGNAL_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;

/// Idle connections are closed after `3*TIMESLOT` with no activity.
const IDLE_EXPIRY: Duration = Duration::from_secs(3 * TIMESLOT.as_secs());

type SharedConnection = Arc<Mutex<HttpConnection>>;

/// One registry entry: the connection plus the timer node guarding its idle expiry. Looked up
/// by token on every event and every drained completion.
struct Slot {
    conn: SharedConnection,
    timer_key: TimerKey,
}

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    signals: Signals,
    registry: Arc<Mutex<HashMap<usize, Slot>>>,
    next_token: usize,
    timers: TimerList,
    worker_pool: WorkerPool,
    completion_rx: CompletionReceiver,
    cred_pool: Arc<CredentialPool>,
    trigger_mode: crate::process_config::TriggerMode,
    dispatch_mode: DispatchMode,
    /// SO_LINGER applied to every accepted connection (`-o` flag): `true` waits a second to
    /// flush on close, `false` closes immediately.
    linger: bool,
    stop: bool,
}

impl Server {
    pub fn new(cfg: &ProcessConfig) -> Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse()?;
        let mut listener = TcpListener::bind(addr)?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;

        let mut signals = Signals::new([SIGTERM])?;
        poll.registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;

        let cred_pool = Arc::new(CredentialPool::init(cfg.session_pool_size, &cfg.users_file)?);
        let doc_root = std::env::current_dir()?.join("root");
        let registry: Arc<Mutex<HashMap<usize, Slot>>> = Arc::new(Mutex::new(HashMap::new()));
        let (completion_tx, completion_rx) = completion::channel();

        let worker_pool = {
            let registry = Arc::clone(&registry);
            let cred_pool = Arc::clone(&cred_pool);
            let doc_root = doc_root.clone();
            let conn_trigger = cfg.trigger_mode.conn;
            WorkerPool::new(cfg.worker_count, cfg.worker_count * 4, move |item: WorkItem| {
                worker_dispatch(&registry, &cred_pool, &doc_root, conn_trigger, item, &completion_tx);
            })
        };

        info!(
            "listening on {} (dispatch={:?}, trigger={:?})",
            addr, cfg.dispatch_mode, cfg.trigger_mode
        );

        Ok(Self {
            poll,
            listener,
            signals,
            registry,
            next_token: FIRST_CONN_TOKEN,
            timers: TimerList::new(),
            worker_pool,
            completion_rx,
            cred_pool,
            trigger_mode: cfg.trigger_mode,
            dispatch_mode: cfg.dispatch_mode,
            linger: cfg.linger,
            stop: false,
        })
    }

    /// Runs until SIGTERM. No graceful drain of in-flight requests is attempted.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        while !self.stop {
            let timeout = self
                .timers
                .next_deadline(Instant::now())
                .unwrap_or(TIMESLOT);
            match self.poll.poll(&mut events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                match event.token() {
                    LISTEN_TOKEN => self.accept()?,
                    SIGNAL_TOKEN => self.drain_signals(),
                    token => self.handle_client_event(token.0, event),
                }
            }

            self.drain_completions();
            self.tick();
        }

        info!("shutdown requested");
        Ok(())
    }

    /// Joins every worker thread and releases credential sessions. The listener and signal
    /// source close on drop.
    pub fn shutdown(self) {
        self.worker_pool.shutdown();
        self.cred_pool.destroy_all();
    }

    /// LT accepts once per event; ET drains until the accept would block.
    fn accept(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.accept_one(stream, peer)?,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
            if self.trigger_mode.listen == Trigger::LevelTriggered {
                return Ok(());
            }
        }
    }

    fn accept_one(&mut self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut registry = self.registry.lock().unwrap();
        if registry.len() >= MAX_CONN {
            warn!("refusing connection from {}: at MAX_CONN capacity", peer);
            let _ = stream.write_all(b"HTTP/1.1 500 Internal Error\r\nConnection: close\r\n\r\nInternal server busy\n");
            return Ok(());
        }

        let so_linger = if self.linger { Some(Duration::from_secs(1)) } else { None };
        let _ = SockRef::from(&stream).set_linger(so_linger);

        let token = self.next_token;
        self.next_token += 1;
        poll_register(&self.poll, &mut stream, token, self.trigger_mode.conn)?;

        let timer_key = self.timers.add_timer(token, Instant::now(), IDLE_EXPIRY);
        registry.insert(
            token,
            Slot { conn: Arc::new(Mutex::new(HttpConnection::new(stream, peer))), timer_key },
        );
        trace!("accepted {} as token {}", peer, token);
        Ok(())
    }

    fn drain_signals(&mut self) {
        for signal in self.signals.pending() {
            if signal == SIGTERM {
                info!("SIGTERM received, stopping after this batch");
                self.stop = true;
            }
        }
    }

    /// Deregisters the token the instant it's claimed, so it's never registered for events
    /// while a worker (or this same inline branch) still owns it.
    fn handle_client_event(&mut self, token: usize, event: &Event) {
        let slot = {
            let registry = self.registry.lock().unwrap();
            match registry.get(&token) {
                Some(slot) => slot.conn.clone(),
                None => return,
            }
        };
        let _ = self.deregister_token(&slot);

        if event.is_readable() {
            self.handle_readable(token, &slot);
        } else if event.is_writable() {
            self.handle_writable(token, &slot);
        }
    }

    fn handle_readable(&mut self, token: usize, slot: &SharedConnection) {
        match self.dispatch_mode {
            DispatchMode::Completion => {
                let outcome = slot.lock().unwrap().read_once(self.trigger_mode.conn);
                match outcome {
                    ReadOutcome::Data => {
                        self.adjust_idle(token);
                        if !self.worker_pool.submit(WorkItem::completion(token)) {
                            warn!("worker queue full, dropping connection {}", token);
                            self.close_connection(token);
                        }
                    }
                    ReadOutcome::WouldBlock => self.rearm_readable(token, slot),
                    ReadOutcome::PeerClose | ReadOutcome::Failed | ReadOutcome::Overflow => {
                        self.close_connection(token);
                    }
                }
            }
            DispatchMode::Readiness => {
                if !self.worker_pool.submit(WorkItem::readiness(token, Op::Read)) {
                    warn!("worker queue full, dropping connection {}", token);
                    self.close_connection(token);
                }
            }
        }
    }

    fn handle_writable(&mut self, token: usize, slot: &SharedConnection) {
        match self.dispatch_mode {
            DispatchMode::Completion => {
                let outcome = slot.lock().unwrap().write_ready();
                self.after_write(token, slot, outcome);
            }
            DispatchMode::Readiness => {
                if !self.worker_pool.submit(WorkItem::readiness(token, Op::Write)) {
                    warn!("worker queue full, dropping connection {}", token);
                    self.close_connection(token);
                }
            }
        }
    }

    fn after_write(&mut self, token: usize, slot: &SharedConnection, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Done => {
                let keep_alive = slot.lock().unwrap().finish_response();
                self.adjust_idle(token);
                if keep_alive {
                    self.rearm_readable(token, slot);
                } else {
                    self.close_connection(token);
                }
            }
            WriteOutcome::WouldBlock => self.rearm_writable(token, slot),
            WriteOutcome::Failed => self.close_connection(token),
        }
    }

    /// Drains the worker->reactor completion channel once per loop iteration.
    fn drain_completions(&mut self) {
        for Completion { token, timer_flag } in completion::drain(&self.completion_rx) {
            if timer_flag {
                self.close_connection(token);
                continue;
            }
            let slot = {
                let registry = self.registry.lock().unwrap();
                match registry.get(&token) {
                    Some(slot) => slot.conn.clone(),
                    None => continue,
                }
            };
            self.adjust_idle(token);
            let wants_write = {
                let conn = slot.lock().unwrap();
                if conn.closed {
                    None
                } else {
                    Some(!conn.write_buffer.is_empty() || matches!(conn.action, ActiveAction::FileDownload(_, r) if r > 0))
                }
            };
            match wants_write {
                None => self.close_connection(token),
                Some(true) => self.rearm_writable(token, &slot),
                Some(false) => self.rearm_readable(token, &slot),
            }
        }
    }

    /// Expires overdue idle timers. The `Poll::poll` timeout above is what drives this tick.
    fn tick(&mut self) {
        for token in self.timers.tick(Instant::now()) {
            warn!("connection {} idle-expired", token);
            self.close_connection(token);
        }
    }

    fn adjust_idle(&mut self, token: usize) {
        let timer_key = self.registry.lock().unwrap().get(&token).map(|s| s.timer_key);
        if let Some(key) = timer_key {
            self.timers.adjust_timer(key, Instant::now(), IDLE_EXPIRY);
        }
    }

    fn rearm_readable(&mut self, token: usize, slot: &SharedConnection) {
        let _ = poll_reregister(&self.poll, &mut slot.lock().unwrap().stream, token, self.trigger_mode.conn, Interest::READABLE);
    }

    fn rearm_writable(&mut self, token: usize, slot: &SharedConnection) {
        let _ = poll_reregister(&self.poll, &mut slot.lock().unwrap().stream, token, self.trigger_mode.conn, Interest::WRITABLE);
    }

    fn deregister_token(&self, slot: &SharedConnection) -> io::Result<()> {
        self.poll.registry().deregister(&mut slot.lock().unwrap().stream)
    }

    fn close_connection(&mut self, token: usize) {
        let slot = self.registry.lock().unwrap().remove(&token);
        if let Some(slot) = slot {
            self.timers.del_timer(slot.timer_key);
            let _ = self.poll.registry().deregister(&mut slot.conn.lock().unwrap().stream);
        }
    }
}

fn worker_dispatch(
    registry: &Arc<Mutex<HashMap<usize, Slot>>>,
    cred_pool: &Arc<CredentialPool>,
    doc_root: &Path,
    conn_trigger: Trigger,
    item: WorkItem,
    completion_tx: &completion::CompletionSender,
) {
    let slot = {
        let registry = registry.lock().unwrap();
        match registry.get(&item.token) {
            Some(slot) => slot.conn.clone(),
            None => return,
        }
    };

    let mut timer_flag = false;
    {
        let mut conn = slot.lock().unwrap();
        match item.op {
            // Completion mode: the reactor already read; just dispatch + write.
            None => finish_after_dispatch(&mut conn, cred_pool, doc_root, &mut timer_flag),
            Some(Op::Read) => match conn.read_once(conn_trigger) {
                ReadOutcome::Data => finish_after_dispatch(&mut conn, cred_pool, doc_root, &mut timer_flag),
                ReadOutcome::WouldBlock => {}
                ReadOutcome::PeerClose | ReadOutcome::Failed | ReadOutcome::Overflow => {
                    conn.closed = true;
                    timer_flag = true;
                }
            },
            Some(Op::Write) => match conn.write_ready() {
                WriteOutcome::Done => {
                    if !conn.finish_response() {
                        conn.closed = true;
                    }
                }
                WriteOutcome::WouldBlock => {}
                WriteOutcome::Failed => {
                    conn.closed = true;
                    timer_flag = true;
                }
            },
        }
    }

    let _ = completion_tx.send(Completion { token: item.token, timer_flag });
}

fn finish_after_dispatch(conn: &mut HttpConnection, cred_pool: &CredentialPool, doc_root: &Path, timer_flag: &mut bool) {
    if !conn.try_parse_and_dispatch(cred_pool, doc_root) {
        return;
    }
    match conn.write_ready() {
        WriteOutcome::Done => {
            if !conn.finish_response() {
                conn.closed = true;
            }
        }
        WriteOutcome::WouldBlock => {}
        WriteOutcome::Failed => {
            conn.closed = true;
            *timer_flag = true;
        }
    }
}

fn poll_register(poll: &Poll, stream: &mut TcpStream, token: usize, trigger: Trigger) -> Result<()> {
    let interest = Interest::READABLE;
    poll.registry().register(stream, Token(token), interest)?;
    let _ = trigger; // edge vs level is a read/accept-loop behaviour, not a registration flag in mio
    Ok(())
}

fn poll_reregister(poll: &Poll, stream: &mut TcpStream, token: usize, trigger: Trigger, interest: Interest) -> Result<()> {
    let _ = trigger;
    poll.registry().reregister(stream, Token(token), interest)?;
    Ok(())
}
