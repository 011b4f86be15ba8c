//! Running sessions
//!
//! A [`Session`] connects a [`Terminal`] to a child process and an output
//! sink. Two threads share the terminal behind one mutex:
//!
//! - the pump reads from the [`PtyBackend`], feeds the parser and writes
//!   device replies back to the child
//! - the render loop wakes on a timer at the configured frame rate and,
//!   if the buffer is dirty, captures a frame under the lock and diffs it
//!   after releasing the lock
//!
//! Any number of mutations between two ticks produce one render. The
//! buffer reports through a bounded [`Event`] channel instead of callbacks,
//! so nothing ever re-enters the lock. Events that find the channel full
//! are dropped. When the child exits the pump posts [`Event::Exited`] with
//! its exit code; the code is also kept on the session for owners that do
//! not poll events.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::event::Event;
use crate::host::{Focusable, InputSink, PtyBackend, Renderable, WindowSize};
use crate::input::{encode_char, encode_key, encode_paste, Key, Modifiers};
use crate::renderer::{DiffRenderer, FrameSnapshot};
use crate::terminal::Terminal;

const READ_CHUNK: usize = 4096;

/// Events held for the owner before new ones are dropped
pub const EVENT_QUEUE: usize = 256;

/// Session error
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("session already stopped")]
    Stopped,
}

/// Messages for the render loop
#[derive(Debug)]
enum Control {
    Focus(bool),
    Invalidate,
    Stop,
}

/// Lock the terminal, recovering the state if a thread panicked while
/// holding it. The terminal is always left renderable between actions.
fn lock(terminal: &Mutex<Terminal>) -> MutexGuard<'_, Terminal> {
    match terminal.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A terminal attached to a child process and an output sink
pub struct Session {
    terminal: Arc<Mutex<Terminal>>,
    pty: Arc<dyn PtyBackend>,
    events: Receiver<Event>,
    control: Sender<Control>,
    stopped: Arc<AtomicBool>,
    exit: Arc<OnceLock<Option<i32>>>,
    focused: bool,
    render_thread: Option<JoinHandle<()>>,
    pump_thread: Option<JoinHandle<()>>,
}

impl Session {
    /// Start the pump and render threads. Output for the sink is produced
    /// at most `frame_rate` times per second.
    pub fn start(
        terminal: Terminal,
        pty: Arc<dyn PtyBackend>,
        sink: Box<dyn Write + Send>,
        frame_rate: u32,
    ) -> Result<Self, SessionError> {
        let (event_tx, events) = mpsc::sync_channel(EVENT_QUEUE);
        let (control, control_rx) = mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let exit = Arc::new(OnceLock::new());

        let mut terminal = terminal;
        terminal.buffer_mut().set_event_sender(event_tx.clone());
        // Draw the initial state on the first tick
        terminal.buffer_mut().mark_dirty();
        let terminal = Arc::new(Mutex::new(terminal));

        let interval = Duration::from_secs(1) / frame_rate.max(1);
        let render_thread = thread::Builder::new().name("mochi-vt-render".into()).spawn({
            let terminal = Arc::clone(&terminal);
            move || render_loop(&terminal, &control_rx, sink, interval)
        })?;

        let pump_thread = thread::Builder::new().name("mochi-vt-pump".into()).spawn({
            let terminal = Arc::clone(&terminal);
            let pty = Arc::clone(&pty);
            let stopped = Arc::clone(&stopped);
            let exit = Arc::clone(&exit);
            move || pump(&terminal, pty.as_ref(), &event_tx, &stopped, &exit)
        })?;

        info!(?interval, "session started");
        Ok(Self {
            terminal,
            pty,
            events,
            control,
            stopped,
            exit,
            focused: true,
            render_thread: Some(render_thread),
            pump_thread: Some(pump_thread),
        })
    }

    /// Notifications from the buffer and the pump
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Shared handle to the terminal
    pub fn terminal(&self) -> Arc<Mutex<Terminal>> {
        Arc::clone(&self.terminal)
    }

    /// Run `f` with the terminal locked
    pub fn with_terminal<R>(&self, f: impl FnOnce(&mut Terminal) -> R) -> R {
        f(&mut lock(&self.terminal))
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Whether the child's output has ended
    pub fn has_exited(&self) -> bool {
        self.exit.get().is_some()
    }

    /// Exit code of the child, once it has exited and reported one
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.get().copied().flatten()
    }

    /// Write raw bytes to the child
    pub fn write_input(&self, bytes: &[u8]) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::Stopped);
        }
        self.pty.write(bytes)?;
        Ok(())
    }

    /// Encode and send a special key under the terminal's current modes
    pub fn send_key(&self, key: Key, modifiers: Modifiers) -> Result<(), SessionError> {
        let bytes = {
            let terminal = lock(&self.terminal);
            encode_key(key, modifiers, terminal.buffer().modes())
        };
        self.write_input(&bytes)
    }

    pub fn send_char(&self, c: char, modifiers: Modifiers) -> Result<(), SessionError> {
        self.write_input(&encode_char(c, modifiers))
    }

    /// Send pasted text, bracketed if the application asked for it
    pub fn paste(&self, text: &str) -> Result<(), SessionError> {
        let bytes = {
            let terminal = lock(&self.terminal);
            encode_paste(text, terminal.buffer().modes())
        };
        self.write_input(&bytes)
    }

    /// Resize the terminal and tell the child
    pub fn resize(&self, size: WindowSize) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::Stopped);
        }
        lock(&self.terminal).resize(usize::from(size.cols), usize::from(size.rows));
        self.pty.resize(size)?;
        debug!(cols = size.cols, rows = size.rows, "session resized");
        Ok(())
    }

    /// Make the next tick redraw everything, e.g. after the sink was
    /// cleared by someone else
    pub fn invalidate(&self) {
        self.send_control(Control::Invalidate);
    }

    fn send_control(&self, message: Control) {
        if self.control.send(message).is_err() {
            debug!("render loop already gone");
        }
    }

    /// Stop both threads and close the child. Stopping twice is a no-op.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.send_control(Control::Stop);
        let closed = self.pty.close();

        for handle in [self.render_thread.take(), self.pump_thread.take()]
            .into_iter()
            .flatten()
        {
            let name = handle.thread().name().unwrap_or("session").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "session thread panicked");
            }
        }
        info!("session stopped");
        closed.map_err(SessionError::from)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("error while stopping session: {}", e);
        }
    }
}

impl Renderable for Session {
    /// On-demand output always renders everything, since it cannot share
    /// the render loop's frame cache
    fn render_to_string(&self) -> String {
        let frame = FrameSnapshot::capture(lock(&self.terminal).buffer());
        DiffRenderer::render_full(&frame)
    }
}

impl Focusable for Session {
    fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        self.send_control(Control::Focus(focused));
    }

    fn is_focused(&self) -> bool {
        self.focused
    }
}

impl InputSink for Session {
    fn send_input(&self, bytes: &[u8]) -> io::Result<()> {
        self.write_input(bytes).map_err(|e| match e {
            SessionError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::BrokenPipe, other),
        })
    }
}

fn render_loop(
    terminal: &Mutex<Terminal>,
    control: &Receiver<Control>,
    mut sink: Box<dyn Write + Send>,
    interval: Duration,
) {
    let mut renderer = DiffRenderer::new();
    loop {
        let mut force = false;
        match control.recv_timeout(interval) {
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Control::Focus(focused)) => {
                renderer.set_focused(focused);
                force = true;
            }
            Ok(Control::Invalidate) => {
                renderer.invalidate();
                force = true;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let frame = {
            let mut terminal = lock(terminal);
            let dirty = terminal.buffer_mut().take_dirty();
            if !dirty && !force {
                continue;
            }
            FrameSnapshot::capture(terminal.buffer())
        };

        let output = renderer.render(&frame);
        if output.is_empty() {
            continue;
        }
        if let Err(e) = sink.write_all(output.as_bytes()).and_then(|()| sink.flush()) {
            warn!("output sink failed, render loop exiting: {}", e);
            break;
        }
    }
    debug!("render loop exited");
}

fn pump(
    terminal: &Mutex<Terminal>,
    pty: &dyn PtyBackend,
    events: &SyncSender<Event>,
    stopped: &AtomicBool,
    exit: &OnceLock<Option<i32>>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match pty.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let replies = {
                    let mut terminal = lock(terminal);
                    terminal.process(&buf[..n]);
                    terminal.take_replies()
                };
                if !replies.is_empty() {
                    if let Err(e) = pty.write(&replies) {
                        warn!("failed to write device reply: {}", e);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !stopped.load(Ordering::SeqCst) {
                    warn!("read from child failed: {}", e);
                }
                break;
            }
        }
    }

    let status = pty.exit_status();
    info!(?status, "child exited");
    let _ = exit.set(status);
    match events.try_send(Event::Exited(status)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!("event queue full, exit kept on the session only"),
        Err(TrySendError::Disconnected(_)) => debug!("event receiver dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// A child process whose output is fed by the test
    struct ScriptedPty {
        output: Mutex<Receiver<Vec<u8>>>,
        pending: Mutex<Vec<u8>>,
        written: Mutex<Vec<u8>>,
        sizes: Mutex<Vec<WindowSize>>,
        closed: AtomicBool,
        exit: Option<i32>,
    }

    impl ScriptedPty {
        fn new(exit: Option<i32>) -> (Arc<Self>, Sender<Vec<u8>>) {
            let (tx, rx) = mpsc::channel();
            let pty = Arc::new(Self {
                output: Mutex::new(rx),
                pending: Mutex::new(Vec::new()),
                written: Mutex::new(Vec::new()),
                sizes: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                exit,
            });
            (pty, tx)
        }

        fn written(&self) -> Vec<u8> {
            self.written.lock().unwrap().clone()
        }
    }

    impl PtyBackend for ScriptedPty {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            loop {
                {
                    let mut pending = self.pending.lock().unwrap();
                    if !pending.is_empty() {
                        let n = pending.len().min(buf.len());
                        buf[..n].copy_from_slice(&pending[..n]);
                        pending.drain(..n);
                        return Ok(n);
                    }
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Ok(0);
                }
                match self.output.lock().unwrap().recv_timeout(Duration::from_millis(5)) {
                    Ok(data) => self.pending.lock().unwrap().extend(data),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return Ok(0),
                }
            }
        }

        fn write(&self, data: &[u8]) -> io::Result<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn resize(&self, size: WindowSize) -> io::Result<()> {
            self.sizes.lock().unwrap().push(size);
            Ok(())
        }

        fn close(&self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn exit_status(&self) -> Option<i32> {
            self.exit
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn start(exit: Option<i32>) -> (Session, Arc<ScriptedPty>, Sender<Vec<u8>>, SharedSink) {
        let (pty, feed) = ScriptedPty::new(exit);
        let sink = SharedSink::default();
        let session = Session::start(
            Terminal::new(20, 4, 100),
            pty.clone(),
            Box::new(sink.clone()),
            200,
        )
        .unwrap();
        (session, pty, feed, sink)
    }

    #[test]
    fn test_child_output_is_rendered() {
        let (mut session, _pty, feed, sink) = start(Some(0));
        feed.send(b"hello \x1b[1mworld".to_vec()).unwrap();
        assert!(wait_until(|| sink.text().contains("world")));
        assert!(sink.text().contains("hello"));
        session.with_terminal(|t| {
            assert_eq!(t.buffer().screen_text().lines().next(), Some("hello world"));
        });
        session.stop().unwrap();
    }

    #[test]
    fn test_device_replies_reach_child() {
        let (mut session, pty, feed, _sink) = start(Some(0));
        feed.send(b"ab\x1b[6n".to_vec()).unwrap();
        assert!(wait_until(|| pty.written() == b"\x1b[1;3R"));
        session.stop().unwrap();
    }

    #[test]
    fn test_child_exit_is_reported() {
        let (mut session, _pty, feed, _sink) = start(Some(3));
        drop(feed);
        let exited = session
            .events()
            .iter()
            .find(|e| matches!(e, Event::Exited(_)));
        assert_eq!(exited, Some(Event::Exited(Some(3))));
        assert_eq!(session.exit_code(), Some(3));
        session.stop().unwrap();
    }

    #[test]
    fn test_unpolled_events_stay_bounded() {
        let (mut session, _pty, feed, sink) = start(Some(3));
        feed.send(vec![0x07; EVENT_QUEUE * 4]).unwrap();
        feed.send(b"done".to_vec()).unwrap();
        assert!(wait_until(|| sink.text().contains("done")));
        drop(feed);

        // The exit is still observable when the queue has no room for it
        assert!(wait_until(|| session.has_exited()));
        assert_eq!(session.exit_code(), Some(3));
        assert!(session.events().try_iter().count() <= EVENT_QUEUE);
        session.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut session, pty, _feed, _sink) = start(None);
        assert!(session.is_running());
        session.stop().unwrap();
        session.stop().unwrap();
        assert!(!session.is_running());
        assert!(pty.closed.load(Ordering::SeqCst));
        assert!(matches!(session.write_input(b"x"), Err(SessionError::Stopped)));
        assert!(session.send_input(b"x").is_err());
    }

    #[test]
    fn test_input_encoding_follows_modes() {
        let (mut session, pty, feed, _sink) = start(None);
        feed.send(b"\x1b[?1h\x1b[?2004h".to_vec()).unwrap();
        assert!(wait_until(|| session.with_terminal(|t| t.buffer().modes().bracketed_paste)));

        session.send_key(Key::Up, Modifiers::default()).unwrap();
        session.paste("ls").unwrap();
        session
            .send_char(
                'c',
                Modifiers {
                    ctrl: true,
                    ..Modifiers::default()
                },
            )
            .unwrap();
        assert_eq!(pty.written(), b"\x1bOA\x1b[200~ls\x1b[201~\x03");
        session.stop().unwrap();
    }

    #[test]
    fn test_resize_reaches_terminal_and_child() {
        let (mut session, pty, _feed, _sink) = start(None);
        session.resize(WindowSize::new(40, 10)).unwrap();
        session.with_terminal(|t| assert_eq!((t.buffer().cols(), t.buffer().rows()), (40, 10)));
        assert_eq!(pty.sizes.lock().unwrap().as_slice(), &[WindowSize::new(40, 10)]);
        session.stop().unwrap();
    }

    #[test]
    fn test_render_to_string_is_full() {
        let (mut session, _pty, feed, sink) = start(None);
        feed.send(b"abc".to_vec()).unwrap();
        assert!(wait_until(|| sink.text().contains("abc")));
        // Two on-demand renders of the same state are identical and complete
        let first = session.render_to_string();
        assert!(first.contains("abc"));
        assert_eq!(session.render_to_string(), first);
        session.stop().unwrap();
    }

    #[test]
    fn test_focus_hides_cursor() {
        let (mut session, _pty, _feed, sink) = start(None);
        assert!(wait_until(|| sink.text().contains("\x1b[?25h")));
        session.set_focused(false);
        assert!(!session.is_focused());
        assert!(wait_until(|| sink.text().ends_with("\x1b[?25l")));
        session.stop().unwrap();
    }
}
