#![forbid(unsafe_code)]
//! A relabeling proxy for the Prometheus exposition text format.
//!
//! The format reference is here:
//! <https://prometheus.io/docs/instrumenting/exposition_formats/>
//!
//! The proxy fetches a raw exposition payload from a per-port backend on the
//! same host, merges a set of override labels into every sample line, and
//! returns the rewritten payload. Everything that is not a sample line
//! (comments, blanks, lines that fail to parse) is passed through verbatim.
use derive_more::Constructor;
pub use parser::{
    parse_label_set,
    parse_sample_line,
};
use std::{
    collections::BTreeMap,
    fmt::Display,
};

pub mod overrides;
mod parser;
pub mod proxy;
pub mod route;
pub mod telemetry;

/// A set of labels identifying a sample, or a set of overrides to apply.
///
/// Keys are unique. Iteration (and therefore serialization) is in ascending
/// key order, so the printed form is deterministic and diffable.
///
/// Example:
/// ```text
/// {name="a",id="1",type="x"}
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Default,
    derive_more::Deref,
    derive_more::DerefMut,
    derive_more::From,
)]
#[repr(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Overlay `overrides` on top of this set. On a key collision the
    /// override value wins.
    pub fn merge(&mut self, overrides: &LabelSet) {
        for (key, value) in overrides.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Display for LabelSet {
    /// Print the label block. An empty set prints nothing at all, not `{}`,
    /// so a sample that ends up with zero labels renders as a bare
    /// `name value`.
    ///
    /// NOTE: the values are assumed to be escaped already
    /// (i.e. '\\', '\\n', '\\"').
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (idx, (key, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            f.write_str(key)?;
            f.write_str("=\"")?;
            f.write_str(value)?;
            f.write_str("\"")?;
        }
        f.write_str("}")?;
        Ok(())
    }
}

/// A parsed representation of one sample line.
///
/// The value and the timestamp are kept as the strings they were scraped as
/// and are never reinterpreted, so they round-trip byte-identically.
///
/// Examples:
/// ```text
/// http_requests_total{method="post",code="200"} 1027 1395066363000
/// up 1
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct SampleLine {
    /// The metric name, excluding the labels.
    pub name: String,
    /// The label block, if the line carried one. Absent is not the same as
    /// empty: `{}` is not valid exposition syntax.
    pub labels: Option<LabelSet>,
    /// The sample value, still a string (numeric or NaN/Inf forms).
    pub value: String,
    /// The optional trailing timestamp token, verbatim.
    pub timestamp: Option<String>,
}

impl Display for SampleLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if let Some(labels) = &self.labels {
            write!(f, "{labels}")?;
        }
        write!(f, " {}", self.value)?;
        if let Some(ts) = &self.timestamp {
            write!(f, " {ts}")?;
        }
        Ok(())
    }
}

/// The classification of one payload line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// A zero-length line.
    Blank,
    /// A line whose first character is `#` (comments, HELP, TYPE).
    Comment(&'a str),
    /// A well-formed sample line.
    Sample(SampleLine),
    /// A non-blank, non-comment line that does not match the sample shape.
    /// Emitted verbatim and counted, never fatal.
    Malformed(&'a str),
}

impl<'a> Line<'a> {
    pub fn classify(line: &'a str) -> Self {
        if line.is_empty() {
            return Line::Blank;
        }
        if line.starts_with('#') {
            return Line::Comment(line);
        }
        match parse_sample_line(line) {
            Some(sample) => Line::Sample(sample),
            None => Line::Malformed(line),
        }
    }
}

/// The result of rewriting one payload.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct Rewritten {
    /// The payload with the overrides merged into every sample line.
    pub payload: String,
    /// The number of sample-shaped lines that could not be parsed.
    pub unprocessed: u64,
}

/// Merge `overrides` into every sample line of `payload`.
///
/// Lines are processed in their original order. Blank and comment lines pass
/// through unchanged; malformed lines pass through unchanged and are counted.
/// The line count and the trailing-newline shape of the input are preserved
/// exactly, since scrapers may be sensitive to either.
pub fn inject(payload: &str, overrides: &LabelSet) -> Rewritten {
    let mut out = String::with_capacity(payload.len());
    let mut unprocessed = 0;
    for (idx, line) in payload.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        match Line::classify(line) {
            Line::Blank => {}
            Line::Comment(text) => out.push_str(text),
            Line::Malformed(text) => {
                unprocessed += 1;
                out.push_str(text);
            }
            Line::Sample(mut sample) => {
                let mut labels = sample.labels.take().unwrap_or_default();
                labels.merge(overrides);
                sample.labels = Some(labels);
                out.push_str(&sample.to_string());
            }
        }
    }
    Rewritten::new(out, unprocessed)
}
