//! StatsD metric records and line parsing
//!
//! Parsing is strict about structure (separators, value, type) but keeps
//! the original line bytes untouched: dispatch forwards `raw`, never a
//! re-serialized form.

use bytes::Bytes;

use crate::error::ParseError;

/// Metric type token from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Counter (`c`)
    Counter,
    /// Timing in milliseconds (`ms`)
    Timing,
    /// Gauge (`g`)
    Gauge,
}

impl MetricKind {
    /// Parse a wire type token
    ///
    /// Returns `None` for anything outside the accepted set.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "c" => Some(Self::Counter),
            "ms" => Some(Self::Timing),
            "g" => Some(Self::Gauge),
            _ => None,
        }
    }

    /// The wire token for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "c",
            Self::Timing => "ms",
            Self::Gauge => "g",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed telemetry line
///
/// `raw` holds the exact bytes of the line as received. Everything else
/// is derived and only used for routing decisions; the payload written to
/// backends is always `raw`.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    /// Metric name - the routing key matched against rule patterns
    pub name: String,

    /// Metric value
    pub value: f64,

    /// Metric type
    pub kind: MetricKind,

    /// Optional sample rate from the `@rate` suffix; parsed but ignored,
    /// records are forwarded as if rate=1
    pub sample_rate: Option<f64>,

    /// Original line bytes, forwarded bit-exact
    pub raw: Bytes,
}

/// Parse a single StatsD line
///
/// `raw` must be exactly one line with no trailing newline. The returned
/// record keeps `raw` as its forwarding payload.
///
/// # Errors
///
/// Returns [`ParseError`] on structural problems, a non-numeric value, or
/// an unknown type token. A malformed sample-rate suffix is ignored
/// rather than rejected - it has no routing semantics.
pub fn parse_line(raw: Bytes) -> Result<MetricRecord, ParseError> {
    let line = std::str::from_utf8(&raw).map_err(|_| ParseError::NotUtf8)?;

    let (name, rest) = line.split_once(':').ok_or(ParseError::MissingValue)?;
    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }

    let (value_token, type_section) =
        rest.split_once('|').ok_or_else(|| ParseError::MissingType {
            name: name.to_string(),
        })?;

    let (type_token, rate_token) = match type_section.split_once('@') {
        Some((t, r)) => (t, Some(r)),
        None => (type_section, None),
    };

    let kind = MetricKind::from_token(type_token).ok_or_else(|| ParseError::UnknownType {
        name: name.to_string(),
        found: type_token.to_string(),
    })?;

    let value: f64 = value_token.parse().map_err(|_| ParseError::InvalidValue {
        name: name.to_string(),
        value: value_token.to_string(),
    })?;

    let sample_rate = rate_token.and_then(|r| r.parse().ok());

    Ok(MetricRecord {
        name: name.to_string(),
        value,
        kind,
        sample_rate,
        raw,
    })
}

/// Split a datagram into its metric lines
///
/// Yields one `Bytes` slice per non-empty line, sharing the packet
/// allocation. Empty segments (a trailing newline, blank lines, an empty
/// packet) produce nothing.
pub fn packet_lines(packet: &Bytes) -> impl Iterator<Item = Bytes> + '_ {
    let mut start = 0;
    std::iter::from_fn(move || {
        while start < packet.len() {
            let end = packet[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|pos| start + pos)
                .unwrap_or(packet.len());
            let line = packet.slice(start..end);
            start = end + 1;
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    })
}
