//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use beacon_device::config::ModemConfig;
use beacon_device::modem::{KeyLevel, Modem, PowerControl, SerialLink};
use beacon_device::{Error, Result, Transport};

/// How the fake module answers `AT+MIPOPEN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenReply {
    Connect,
    Refused,
    Silent,
}

#[derive(Debug)]
struct ModuleState {
    baud: u32,
    responsive_baud: Option<u32>,
    echo: bool,
    call_active: bool,
    open_reply: OpenReply,
    send_prompt: bool,
    registered_after: u32,
    creg_polls: u32,
    line: Vec<u8>,
    raw_remaining: usize,
    rx: VecDeque<u8>,
    bauds: Vec<u32>,
    commands: Vec<(u32, String)>,
    payload: Vec<u8>,
    reply_after_upload: Option<(usize, Vec<u8>)>,
}

/// Scripted AT-command module behind a fake UART
///
/// Clones share state so a test can keep a handle after moving one into a
/// [`Modem`].
#[derive(Debug, Clone)]
pub struct MockSerial {
    state: Arc<Mutex<ModuleState>>,
}

impl MockSerial {
    /// Module that answers only at `baud` (`None` for a dead module)
    pub fn responsive_at(baud: Option<u32>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ModuleState {
                baud: 0,
                responsive_baud: baud,
                echo: true,
                call_active: true,
                open_reply: OpenReply::Connect,
                send_prompt: true,
                registered_after: 0,
                creg_polls: 0,
                line: Vec::new(),
                raw_remaining: 0,
                rx: VecDeque::new(),
                bauds: Vec::new(),
                commands: Vec::new(),
                payload: Vec::new(),
                reply_after_upload: None,
            })),
        }
    }

    /// Module already running at 115200 with echo off
    pub fn ready() -> Self {
        let serial = Self::responsive_at(Some(115_200));
        {
            let mut state = serial.lock();
            state.echo = false;
            state.baud = 115_200;
        }
        serial
    }

    fn lock(&self) -> MutexGuard<'_, ModuleState> {
        self.state.lock().expect("mock serial poisoned")
    }

    pub fn with_call_active(self, active: bool) -> Self {
        self.lock().call_active = active;
        self
    }

    pub fn with_open_reply(self, reply: OpenReply) -> Self {
        self.lock().open_reply = reply;
        self
    }

    pub fn with_send_prompt(self, prompt: bool) -> Self {
        self.lock().send_prompt = prompt;
        self
    }

    /// Report unregistered for the first `polls` `AT+CREG?` queries
    pub fn with_registration_after(self, polls: u32) -> Self {
        self.lock().registered_after = polls;
        self
    }

    /// Once `upload` payload bytes have been sent, deliver `reply` as
    /// `+MIPRTCP:` notifications
    pub fn with_reply_after_upload(self, upload: usize, reply: Vec<u8>) -> Self {
        self.lock().reply_after_upload = Some((upload, reply));
        self
    }

    /// Make the module start answering at `baud`
    pub fn revive_at(&self, baud: u32) {
        self.lock().responsive_baud = Some(baud);
    }

    /// Queue unsolicited bytes as if the module had sent them
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Every baud rate the UART was set to, in order
    pub fn bauds(&self) -> Vec<u32> {
        self.lock().bauds.clone()
    }

    /// Every command line written, with the baud rate it was written at
    pub fn commands(&self) -> Vec<(u32, String)> {
        self.lock().commands.clone()
    }

    /// Command texts only
    pub fn command_texts(&self) -> Vec<String> {
        self.lock().commands.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Raw bytes written after `>` prompts
    pub fn payload(&self) -> Vec<u8> {
        self.lock().payload.clone()
    }
}

impl ModuleState {
    fn respond(&mut self, text: &str) {
        self.rx.extend(text.bytes());
    }

    fn hears(&self) -> bool {
        self.responsive_baud == Some(self.baud)
    }

    fn handle_line(&mut self, line: &str) {
        self.commands.push((self.baud, line.to_string()));
        if !self.hears() {
            return;
        }
        if self.echo {
            self.respond(&format!("{line}\r"));
        }

        if line == "AT" {
            self.respond("\r\nOK\r\n");
        } else if line == "ATE0" {
            self.echo = false;
            self.respond("\r\nOK\r\n");
        } else if let Some(baud) = line.strip_prefix("AT+IPR=") {
            self.respond("\r\nOK\r\n");
            self.responsive_baud = baud.parse().ok();
        } else if line == "AT+MIPCLOSE=1" || line.starts_with("AT+CGDCONT=") {
            self.respond("\r\nOK\r\n");
        } else if line == "AT+MIPCALL?" {
            if self.call_active {
                self.respond("\r\n+MIPCALL: 1,10.0.0.2\r\n\r\nOK\r\n");
            } else {
                self.respond("\r\n+MIPCALL: 0\r\n\r\nOK\r\n");
            }
        } else if line == "AT+MIPCALL=1" {
            self.call_active = true;
            self.respond("\r\nOK\r\n\r\n+MIPCALL: 10.0.0.2\r\n");
        } else if line.starts_with("AT+MIPOPEN=") {
            match self.open_reply {
                OpenReply::Connect => self.respond("\r\nOK\r\n\r\n+MIPOPEN: 1,1\r\n"),
                OpenReply::Refused => self.respond("\r\nOK\r\n\r\n+MIPOPEN: 1,0\r\n"),
                OpenReply::Silent => self.respond("\r\nOK\r\n"),
            }
        } else if let Some(len) = line.strip_prefix("AT+MIPSEND=1,") {
            if self.send_prompt {
                self.raw_remaining = len.parse().unwrap_or(0);
                self.respond("\r\n>");
            } else {
                self.respond("\r\nERROR\r\n");
            }
        } else if line == "AT+CSQ" {
            self.respond("\r\n+CSQ: 20,99\r\n\r\nOK\r\n");
        } else if line == "AT+CREG?" {
            self.creg_polls += 1;
            if self.creg_polls > self.registered_after {
                self.respond("\r\n+CREG: 0,1\r\n\r\nOK\r\n");
            } else {
                self.respond("\r\n+CREG: 0,2\r\n\r\nOK\r\n");
            }
        } else {
            self.respond("\r\nERROR\r\n");
        }
    }

    fn take_raw(&mut self, byte: u8) {
        self.payload.push(byte);
        self.raw_remaining -= 1;
        if self.raw_remaining > 0 {
            return;
        }

        self.respond("\r\nOK\r\n");
        let ready = matches!(&self.reply_after_upload, Some((n, _)) if self.payload.len() >= *n);
        if ready {
            if let Some((_, reply)) = self.reply_after_upload.take() {
                for chunk in reply.chunks(512) {
                    self.respond(&format!("\r\n+MIPRTCP: 1,{},", chunk.len()));
                    self.rx.extend(chunk.iter().copied());
                }
            }
        }
    }
}

impl SerialLink for MockSerial {
    fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        let mut state = self.lock();
        state.baud = baud;
        state.bauds.push(baud);
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        for &byte in data {
            if state.raw_remaining > 0 {
                state.take_raw(byte);
                continue;
            }
            match byte {
                b'\n' => {
                    let line = String::from_utf8_lossy(&state.line).trim().to_string();
                    state.line.clear();
                    if !line.is_empty() {
                        state.handle_line(&line);
                    }
                }
                _ => state.line.push(byte),
            }
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        let n = state.rx.len().min(buf.len());
        for (out, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *out = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.lock().rx.clear();
        Ok(())
    }
}

/// Records supply and power-key transitions
#[derive(Debug, Clone, Default)]
pub struct MockPower {
    log: Arc<Mutex<Vec<PowerEvent>>>,
    revive: Option<(MockSerial, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Supply(bool),
    Key(KeyLevel),
}

impl MockPower {
    /// Power lines that bring `serial` back at `baud` once the key is released
    pub fn reviving(serial: MockSerial, baud: u32) -> Self {
        Self {
            log: Arc::default(),
            revive: Some((serial, baud)),
        }
    }

    pub fn events(&self) -> Vec<PowerEvent> {
        self.log.lock().expect("mock power poisoned").clone()
    }
}

impl PowerControl for MockPower {
    fn set_supply(&mut self, on: bool) {
        self.log
            .lock()
            .expect("mock power poisoned")
            .push(PowerEvent::Supply(on));
    }

    fn set_power_key(&mut self, level: KeyLevel) {
        self.log
            .lock()
            .expect("mock power poisoned")
            .push(PowerEvent::Key(level));
        if level == KeyLevel::Released {
            if let Some((serial, baud)) = &self.revive {
                serial.revive_at(*baud);
            }
        }
    }
}

/// Modem over a scripted module with default configuration
pub fn mock_modem(serial: MockSerial) -> Modem<MockSerial, MockPower> {
    Modem::new(serial, MockPower::default(), ModemConfig::default())
}

/// How a [`ScriptedTransport`] ends its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEnd {
    Eof,
    Idle,
    Broken,
}

/// In-memory transport replaying a canned reply
#[derive(Debug)]
pub struct ScriptedTransport {
    pub reachable: bool,
    pub connected: bool,
    pub sent: Vec<u8>,
    pub sends: usize,
    pub closes: usize,
    pub reply: VecDeque<Vec<u8>>,
    pub end: ReplyEnd,
}

impl ScriptedTransport {
    pub fn new(reply: Vec<Vec<u8>>, end: ReplyEnd) -> Self {
        Self {
            reachable: true,
            connected: false,
            sent: Vec::new(),
            sends: 0,
            closes: 0,
            reply: reply.into(),
            end,
        }
    }

    pub fn unreachable() -> Self {
        let mut transport = Self::new(Vec::new(), ReplyEnd::Eof);
        transport.reachable = false;
        transport
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if !self.reachable {
            return Err(Error::Transport(format!("{host}:{port} unreachable")));
        }
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::Transport("not connected".to_string()));
        }
        self.sends += 1;
        self.sent.extend_from_slice(data);
        Ok(())
    }

    async fn receive_chunk(&mut self, buf: &mut [u8], idle: Duration) -> Result<usize> {
        if let Some(mut chunk) = self.reply.pop_front() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.reply.push_front(chunk.split_off(n));
            }
            return Ok(n);
        }
        match self.end {
            ReplyEnd::Eof => Ok(0),
            ReplyEnd::Idle => {
                tokio::time::sleep(idle).await;
                Err(Error::Timeout("idle".to_string()))
            }
            ReplyEnd::Broken => Err(Error::Transport("connection reset".to_string())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.closes += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Hex-encode a directive and terminate it for the reply stream
pub fn directive_frame(json: &str) -> Vec<u8> {
    let mut frame = hex::encode(json).into_bytes();
    frame.push(b'*');
    frame
}
