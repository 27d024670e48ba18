//! Cellular module control over a UART
//!
//! [`Modem`] owns the serial link, the power lines and the inbound payload
//! path. Everything read from the UART, including bytes that arrive while a
//! command is waiting for its response, goes through the [`RxAssembler`]
//! first. Socket payload lands in an internal ring; only the remaining text
//! reaches the response matchers.
//!
//! Bring-up runs `PoweredOff → Syncing → (HardReset) → Handshake → Ready`.
//! TCP sessions run `Ready → TcpConnecting → TcpOpen → TcpClosing → Ready`.

pub mod at;
pub mod power;
pub mod rx;
pub mod serial;

use std::time::Duration;

use tokio::time::{Instant, sleep};

pub use at::{AtCommand, signal_percent};
pub use power::{KeyLevel, LogPowerControl, PowerControl};
pub use rx::RxAssembler;
pub use serial::{SerialLink, UartPort};

use crate::Result;
use crate::config::ModemConfig;
use crate::ring::{Consumer, Producer, ring_buffer};
use at::{LineBuffer, Transcript};

/// Inbound payload ring size
pub const RX_BUFFER_SIZE: usize = 8192;

/// Bytes pulled from the UART per pump
const READ_CHUNK: usize = 256;

/// Sleep between polls while waiting on the UART
const POLL_INTERVAL: Duration = Duration::from_millis(5);

const SUPPLY_SETTLE: Duration = Duration::from_millis(2000);
const UART_SETTLE: Duration = Duration::from_millis(100);
const BAUD_SETTLE: Duration = Duration::from_millis(50);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const BAUD_SWITCH_DELAY: Duration = Duration::from_millis(500);

const KEY_HIGH_HOLD: Duration = Duration::from_millis(100);
const KEY_LOW_HOLD: Duration = Duration::from_millis(2500);
const RESET_BOOT_WAIT: Duration = Duration::from_secs(10);
const RESET_POKE_INTERVAL: Duration = Duration::from_millis(500);
const RESET_POKES: u32 = 10;

const HANDSHAKE_ATTEMPTS: u32 = 10;
const HANDSHAKE_SETTLE: Duration = Duration::from_millis(100);

const COMMAND_TIMEOUT: Duration = Duration::from_millis(500);
const CALL_TIMEOUT: Duration = Duration::from_secs(3);
const OPEN_TIMEOUT: Duration = Duration::from_secs(20);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
const PROMPT_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const REGISTRATION_POLL: Duration = Duration::from_secs(1);

/// Position in the module lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    PoweredOff,
    Syncing,
    HardReset,
    Handshake,
    Ready,
    TcpConnecting,
    TcpOpen,
    TcpClosing,
}

/// Outcome of the last bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemHealth {
    /// Not brought up yet
    Unknown,
    /// Synced and handshaken
    Ready,
    /// Synced, but the handshake never got a clean `OK`
    Degraded,
    /// No baud rate and no hard reset produced a reply
    NotResponding,
}

/// Cellular module driver
pub struct Modem<S, P> {
    serial: S,
    power: P,
    config: ModemConfig,
    baud: u32,
    synced: bool,
    state: ModemState,
    health: ModemHealth,
    assembler: RxAssembler,
    rx_producer: Producer,
    rx_consumer: Consumer,
    dropped: u64,
}

impl<S: SerialLink, P: PowerControl> Modem<S, P> {
    /// Wrap a serial link and power lines; nothing is driven until [`start`](Self::start)
    pub fn new(serial: S, power: P, config: ModemConfig) -> Self {
        let (rx_producer, rx_consumer) = ring_buffer(RX_BUFFER_SIZE);
        let baud = config.target_baud;
        Self {
            serial,
            power,
            config,
            baud,
            synced: false,
            state: ModemState::PoweredOff,
            health: ModemHealth::Unknown,
            assembler: RxAssembler::new(),
            rx_producer,
            rx_consumer,
            dropped: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ModemState {
        self.state
    }

    #[must_use]
    pub const fn health(&self) -> ModemHealth {
        self.health
    }

    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.synced
    }

    /// Baud rate the UART is currently set to
    #[must_use]
    pub const fn baud(&self) -> u32 {
        self.baud
    }

    /// Payload bytes dropped because the inbound ring was full
    #[must_use]
    pub const fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    /// Payload bytes waiting to be popped
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.rx_consumer.len()
    }

    /// Power on, sync the baud rate and run the handshake
    ///
    /// Failures leave the module degraded rather than erroring; check
    /// [`health`](Self::health) afterwards.
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn start(&mut self) -> Result<ModemHealth> {
        self.power_on().await?;

        if !self.sync_baud().await? {
            return Ok(self.health);
        }

        self.handshake().await?;
        Ok(self.health)
    }

    /// Enable the supply and open the UART at the target rate
    ///
    /// # Errors
    ///
    /// Returns error if the UART cannot be configured
    pub async fn power_on(&mut self) -> Result<()> {
        self.power.set_supply(true);
        sleep(SUPPLY_SETTLE).await;

        self.set_baud(self.config.target_baud)?;
        sleep(UART_SETTLE).await;

        tracing::info!(baud = self.baud, "modem powered on");
        Ok(())
    }

    /// Find the module's baud rate and force it to the target
    ///
    /// Falls back to [`hard_reset`](Self::hard_reset) after the configured
    /// number of full probe cycles.
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn sync_baud(&mut self) -> Result<bool> {
        self.state = ModemState::Syncing;
        self.synced = false;
        let target = self.config.target_baud;
        let candidates = self.config.baud_candidates.clone();

        for cycle in 1..=self.config.probe_cycles {
            for &baud in &candidates {
                if !self.probe(baud).await? {
                    continue;
                }

                if baud == target {
                    tracing::info!(baud, cycle, "module synced");
                    self.synced = true;
                    return Ok(true);
                }

                tracing::info!(found = baud, target, "module found, switching baud rate");
                self.send_command(&AtCommand::SetBaud(target))?;
                sleep(BAUD_SWITCH_DELAY).await;

                if self.probe(target).await? {
                    tracing::info!(baud = target, cycle, "module synced");
                    self.synced = true;
                    return Ok(true);
                }
                tracing::warn!(found = baud, target, "module did not answer after baud switch");
            }
            tracing::debug!(cycle, "probe cycle found no module");
        }

        tracing::warn!(
            cycles = self.config.probe_cycles,
            "baud sync failed, trying hard reset"
        );
        self.hard_reset().await
    }

    /// Test whether the module answers `AT` at `baud`
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn probe(&mut self, baud: u32) -> Result<bool> {
        self.set_baud(baud)?;
        sleep(BAUD_SETTLE).await;
        self.serial.clear_input()?;

        self.send_command(&AtCommand::Attention)?;
        let (answered, _) = self.wait_for(PROBE_TIMEOUT, at::is_probe_reply).await?;
        tracing::debug!(baud, answered, "baud probe");
        Ok(answered)
    }

    /// Cycle the power key and wait for the module to come back at the target rate
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn hard_reset(&mut self) -> Result<bool> {
        self.state = ModemState::HardReset;
        tracing::warn!("hard resetting module");

        self.power.set_power_key(KeyLevel::High);
        sleep(KEY_HIGH_HOLD).await;
        self.power.set_power_key(KeyLevel::Low);
        sleep(KEY_LOW_HOLD).await;
        self.power.set_power_key(KeyLevel::High);
        self.power.set_power_key(KeyLevel::Released);

        sleep(RESET_BOOT_WAIT).await;

        let target = self.config.target_baud;
        if self.probe(target).await? {
            tracing::info!(baud = target, "module synced after hard reset");
            self.synced = true;
            return Ok(true);
        }

        for poke in 1..=RESET_POKES {
            self.send_command(&AtCommand::Attention)?;
            sleep(RESET_POKE_INTERVAL).await;
            if self.pump()? > 0 {
                tracing::info!(baud = target, poke, "module answered after hard reset");
                self.synced = true;
                return Ok(true);
            }
        }

        tracing::error!("module not responding");
        self.synced = false;
        self.health = ModemHealth::NotResponding;
        Ok(false)
    }

    /// Confirm the module answers reliably and turn echo off
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn handshake(&mut self) -> Result<bool> {
        self.state = ModemState::Handshake;

        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            self.send_command(&AtCommand::Attention)?;
            sleep(HANDSHAKE_SETTLE).await;

            if self.wait_ok(COMMAND_TIMEOUT).await? {
                self.send_command(&AtCommand::EchoOff)?;
                if !self.wait_ok(COMMAND_TIMEOUT).await? {
                    tracing::warn!("echo off not acknowledged");
                }
                tracing::info!(attempt, "module ready");
                self.state = ModemState::Ready;
                self.health = ModemHealth::Ready;
                return Ok(true);
            }
            self.drain()?;
        }

        tracing::warn!(attempts = HANDSHAKE_ATTEMPTS, "handshake failed, module degraded");
        self.state = ModemState::Ready;
        self.health = ModemHealth::Degraded;
        Ok(false)
    }

    /// Drop buffered payload and any partially parsed notification
    pub fn reset_session(&mut self) {
        if !self.assembler.is_idle() {
            tracing::debug!(
                remaining = self.assembler.remaining(),
                "discarding partial notification"
            );
        }
        self.assembler.reset();
        self.rx_consumer.clear();
    }

    /// Open TCP socket 1 to `host:port`, activating the IP context if needed
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure; a refused or timed out
    /// connection is `Ok(false)`
    pub async fn connect_tcp(&mut self, host: &str, port: u16) -> Result<bool> {
        self.state = ModemState::TcpConnecting;
        self.reset_session();

        self.send_command(&AtCommand::CloseSocket)?;
        self.wait_ok(COMMAND_TIMEOUT).await?;

        self.send_command(&AtCommand::QueryCall)?;
        let (_, reply) = self
            .wait_for(COMMAND_TIMEOUT, |t| {
                t.contains("+MIPCALL: 0") || t.contains("OK") || t.contains("ERROR")
            })
            .await?;

        if reply.contains("+MIPCALL: 0") {
            tracing::info!(apn = %self.config.apn, "activating ip context");
            let apn = self.config.apn.clone();
            self.send_command(&AtCommand::DefinePdp { apn: &apn })?;
            self.wait_ok(COMMAND_TIMEOUT).await?;
            self.send_command(&AtCommand::StartCall)?;
            if !self.wait_ok(CALL_TIMEOUT).await? {
                tracing::warn!("ip context activation not acknowledged");
            }
        }

        // Late payload from the old socket may have arrived during the waits
        self.reset_session();

        self.send_command(&AtCommand::OpenSocket { host, port })?;
        let opened = self
            .wait_line(OPEN_TIMEOUT, at::classify_open_line)
            .await?;

        match opened {
            Some(true) => {
                tracing::info!(host, port, "tcp connected");
                self.state = ModemState::TcpOpen;
                Ok(true)
            }
            Some(false) => {
                tracing::warn!(host, port, "tcp connect refused");
                self.state = ModemState::Ready;
                Ok(false)
            }
            None => {
                tracing::warn!(host, port, "tcp connect timed out");
                self.state = ModemState::Ready;
                Ok(false)
            }
        }
    }

    /// Close TCP socket 1
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn close_tcp(&mut self) -> Result<bool> {
        self.state = ModemState::TcpClosing;
        self.send_command(&AtCommand::CloseSocket)?;
        let closed = self.wait_ok(CLOSE_TIMEOUT).await?;
        self.state = ModemState::Ready;
        tracing::debug!(closed, "tcp closed");
        Ok(closed)
    }

    /// Send `data` on the open socket
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure; a missing prompt or
    /// acknowledgement is `Ok(false)`
    pub async fn send(&mut self, data: &[u8]) -> Result<bool> {
        if data.is_empty() {
            return Ok(true);
        }

        self.send_command(&AtCommand::Send { len: data.len() })?;
        let (prompted, _) = self.wait_for(PROMPT_TIMEOUT, |t| t.contains(">")).await?;
        if !prompted {
            tracing::warn!(len = data.len(), "no send prompt");
            return Ok(false);
        }

        tracing::trace!(len = data.len(), "uart tx payload");
        self.serial.write_all(data)?;

        let (acked, _) = self.wait_for(SEND_ACK_TIMEOUT, |t| t.contains("OK")).await?;
        if !acked {
            tracing::warn!(len = data.len(), "send not acknowledged");
        }
        Ok(acked)
    }

    /// Read pending UART bytes once, routing payload into the inbound ring
    ///
    /// Returns the number of bytes read from the UART.
    ///
    /// # Errors
    ///
    /// Returns error on a hard UART failure
    pub fn pump(&mut self) -> Result<usize> {
        self.pump_with(|_| {})
    }

    /// Pop buffered payload into `buf`
    pub fn pop_payload(&mut self, buf: &mut [u8]) -> usize {
        self.rx_consumer.pop_slice(buf)
    }

    /// Query `AT+CSQ`, returning the raw RSSI (0..=31, 99 unknown)
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn signal_quality(&mut self) -> Result<Option<u8>> {
        self.send_command(&AtCommand::SignalQuality)?;
        let csq = self.wait_line(COMMAND_TIMEOUT, at::parse_csq).await?;
        tracing::debug!(?csq, "signal quality");
        Ok(csq)
    }

    /// Poll `AT+CREG?` once per second until registered (home or roaming)
    ///
    /// # Errors
    ///
    /// Returns error only on a hard UART failure
    pub async fn wait_for_registration(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            self.send_command(&AtCommand::Registration)?;
            let stat = self.wait_line(COMMAND_TIMEOUT, at::parse_creg).await?;
            if matches!(stat, Some(1 | 5)) {
                tracing::info!(?stat, "network registered");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::warn!(?stat, "network registration timed out");
                return Ok(false);
            }
            sleep(REGISTRATION_POLL).await;
        }
    }

    fn set_baud(&mut self, baud: u32) -> Result<()> {
        self.serial.set_baud_rate(baud)?;
        self.baud = baud;
        Ok(())
    }

    fn send_command(&mut self, command: &AtCommand<'_>) -> Result<()> {
        tracing::trace!(%command, "uart tx");
        self.serial.write_all(command.to_line().as_bytes())
    }

    fn pump_with(&mut self, mut on_text: impl FnMut(u8)) -> Result<usize> {
        let mut buf = [0u8; READ_CHUNK];
        let n = self.serial.read_available(&mut buf)?;
        if n == 0 {
            return Ok(0);
        }

        tracing::trace!(
            bytes = n,
            data = %String::from_utf8_lossy(&buf[..n]).escape_debug(),
            "uart rx"
        );

        for &byte in &buf[..n] {
            match self.assembler.feed(byte) {
                Some(payload) => {
                    if !self.rx_producer.push(payload) {
                        self.dropped += 1;
                        if self.dropped.is_power_of_two() {
                            tracing::warn!(dropped = self.dropped, "inbound buffer full, dropping payload");
                        }
                    }
                }
                None => on_text(byte),
            }
        }
        Ok(n)
    }

    /// Discard pending text; payload is still routed
    fn drain(&mut self) -> Result<()> {
        while self.pump()? > 0 {}
        Ok(())
    }

    /// Collect text until `done` matches or `timeout` elapses
    async fn wait_for(
        &mut self,
        timeout: Duration,
        done: impl Fn(&Transcript) -> bool,
    ) -> Result<(bool, Transcript)> {
        let deadline = Instant::now() + timeout;
        let mut transcript = Transcript::new();
        loop {
            self.pump_with(|b| transcript.push(b))?;
            if done(&transcript) {
                return Ok((true, transcript));
            }
            if Instant::now() >= deadline {
                return Ok((false, transcript));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_ok(&mut self, timeout: Duration) -> Result<bool> {
        let (ok, _) = self.wait_for(timeout, |t| t.contains("OK")).await?;
        Ok(ok)
    }

    /// Read text lines until `classify` yields a value or `timeout` elapses
    async fn wait_line<T>(
        &mut self,
        timeout: Duration,
        mut classify: impl FnMut(&str) -> Option<T>,
    ) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut lines = LineBuffer::new();
        let mut completed = Vec::new();
        loop {
            self.pump_with(|b| {
                if let Some(line) = lines.push(b) {
                    completed.push(line);
                }
            })?;
            for line in completed.drain(..) {
                if line.is_empty() {
                    continue;
                }
                tracing::trace!(%line, "uart line");
                if let Some(found) = classify(&line) {
                    return Ok(Some(found));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
