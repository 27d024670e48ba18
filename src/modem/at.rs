//! AT command vocabulary and response matching

use std::fmt;

/// Text kept by a [`Transcript`] before the oldest half is discarded
const TRANSCRIPT_LIMIT: usize = 1024;

/// Longest line a [`LineBuffer`] keeps
const LINE_LIMIT: usize = 256;

/// Commands understood by the cellular module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand<'a> {
    /// `AT`: liveness check
    Attention,
    /// `ATE0`: disable local echo
    EchoOff,
    /// `AT+IPR=<baud>`: set UART baud rate
    SetBaud(u32),
    /// `AT+MIPCLOSE=1`: close socket 1
    CloseSocket,
    /// `AT+MIPCALL?`: query IP context state
    QueryCall,
    /// `AT+CGDCONT=1,"IP","<apn>"`: define PDP context
    DefinePdp { apn: &'a str },
    /// `AT+MIPCALL=1`: activate IP context
    StartCall,
    /// `AT+MIPOPEN=1,0,"<host>",<port>,0`: open TCP socket 1
    OpenSocket { host: &'a str, port: u16 },
    /// `AT+MIPSEND=1,<len>`: send raw bytes on socket 1
    Send { len: usize },
    /// `AT+CSQ`: signal quality
    SignalQuality,
    /// `AT+CREG?`: network registration
    Registration,
}

impl fmt::Display for AtCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attention => write!(f, "AT"),
            Self::EchoOff => write!(f, "ATE0"),
            Self::SetBaud(baud) => write!(f, "AT+IPR={baud}"),
            Self::CloseSocket => write!(f, "AT+MIPCLOSE=1"),
            Self::QueryCall => write!(f, "AT+MIPCALL?"),
            Self::DefinePdp { apn } => write!(f, "AT+CGDCONT=1,\"IP\",\"{apn}\""),
            Self::StartCall => write!(f, "AT+MIPCALL=1"),
            Self::OpenSocket { host, port } => write!(f, "AT+MIPOPEN=1,0,\"{host}\",{port},0"),
            Self::Send { len } => write!(f, "AT+MIPSEND=1,{len}"),
            Self::SignalQuality => write!(f, "AT+CSQ"),
            Self::Registration => write!(f, "AT+CREG?"),
        }
    }
}

impl AtCommand<'_> {
    /// Wire form, terminated with CR LF
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{self}\r\n")
    }
}

/// Bounded accumulator of non-payload text received while waiting
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    text: String,
    received: usize,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte (bytes map to chars one-to-one)
    pub fn push(&mut self, byte: u8) {
        if self.text.len() >= TRANSCRIPT_LIMIT {
            let cut = self
                .text
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= TRANSCRIPT_LIMIT / 2)
                .unwrap_or(self.text.len());
            self.text.replace_range(..cut, "");
        }
        self.text.push(char::from(byte));
        self.received += 1;
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Total bytes pushed, including any discarded
    #[must_use]
    pub const fn received(&self) -> usize {
        self.received
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Reply heuristic used while probing a baud rate
///
/// `OK` or `ERROR` prove the module decoded the command. An `AT` echo followed
/// by anything else is also accepted; this can be fooled by module chatter but
/// matches what modules in auto-baud mode actually send back.
#[must_use]
pub fn is_probe_reply(transcript: &Transcript) -> bool {
    transcript.contains("OK")
        || transcript.contains("ERROR")
        || (transcript.contains("AT") && transcript.received() > 4)
}

/// Splits non-payload text into `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: String,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte, returning the trimmed line when it completes
    pub fn push(&mut self, byte: u8) -> Option<String> {
        if byte == b'\n' {
            let line = self.line.trim().to_string();
            self.line.clear();
            return Some(line);
        }
        if self.line.len() < LINE_LIMIT {
            self.line.push(char::from(byte));
        }
        None
    }
}

/// Outcome of a `+MIPOPEN` wait line: `Some(true)` opened, `Some(false)` refused
#[must_use]
pub fn classify_open_line(line: &str) -> Option<bool> {
    let is_open = line.contains("+MIPOPEN:");
    if line.contains("CONNECT") || (is_open && line.contains(",1")) {
        return Some(true);
    }
    if line.contains("ERROR") || (is_open && line.contains(",0")) {
        return Some(false);
    }
    None
}

/// Parse the RSSI field of `+CSQ: <rssi>,<ber>`
#[must_use]
pub fn parse_csq(line: &str) -> Option<u8> {
    let rest = line.split("+CSQ:").nth(1)?;
    rest.split(',').next()?.trim().parse().ok()
}

/// Parse the status field of `+CREG: <n>,<stat>` (or `+CREG: <stat>`)
#[must_use]
pub fn parse_creg(line: &str) -> Option<u8> {
    let rest = line.split("+CREG:").nth(1)?;
    let mut fields = rest.split(',').map(str::trim);
    let first = fields.next()?;
    fields.next().unwrap_or(first).parse().ok()
}

/// Map an RSSI reading (0..=31, 99 unknown) to a 0..=100 bar value
#[must_use]
pub fn signal_percent(csq: u8) -> u8 {
    if csq == 0 || csq == 99 {
        return 0;
    }
    let clamped = u16::from(csq.min(31));
    #[allow(clippy::cast_possible_truncation)]
    let percent = (clamped * 100 / 31) as u8;
    percent
}
