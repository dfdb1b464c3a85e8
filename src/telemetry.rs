//! Process-wide counters, modeled as an injected registry rather than
//! global statics so the core stays testable without registration side
//! effects at construction time.
use prometheus::{
    Encoder,
    IntCounter,
    IntCounterVec,
    Opts,
    Registry,
    TextEncoder,
};

/// The kinds of per-request errors we count. The kebab-case rendering is
/// used as the `kind` label value on the error counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    ListLabelsDir,
    ReadLabelFile,
    BackendFetch,
    RouteParse,
}

/// The proxy's own counters. Cheap to clone: the underlying prometheus
/// types are shared handles.
#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    requests: IntCounterVec,
    unprocessed_lines: IntCounter,
    errors: IntCounterVec,
}

impl Telemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new(
                "label_proxy_requests_total",
                "The number of host:port/path requests served.",
            ),
            &["code", "port"],
        )?;
        let unprocessed_lines = IntCounter::new(
            "label_proxy_unprocessed_lines_total",
            "The number of sample-shaped lines unable to be processed.",
        )?;
        let errors = IntCounterVec::new(
            Opts::new("label_proxy_errors_total", "The number of errors by kind."),
            &["kind"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(unprocessed_lines.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        Ok(Self {
            registry,
            requests,
            unprocessed_lines,
            errors,
        })
    }

    /// Count one served request by response status code and backend port.
    pub fn request_served(&self, code: &str, port: &str) {
        self.requests.with_label_values(&[code, port]).inc();
    }

    /// Count the malformed lines of one rewritten payload.
    pub fn lines_unprocessed(&self, count: u64) {
        self.unprocessed_lines.inc_by(count);
    }

    /// Count one error of the given kind.
    pub fn error(&self, kind: ErrorKind) {
        self.errors.with_label_values(&[kind.as_ref()]).inc();
    }

    /// Render the registry in the exposition text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ErrorKind,
        Telemetry,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_kind_labels() {
        let cases = [
            (ErrorKind::ListLabelsDir, "list-labels-dir"),
            (ErrorKind::ReadLabelFile, "read-label-file"),
            (ErrorKind::BackendFetch, "backend-fetch"),
            (ErrorKind::RouteParse, "route-parse"),
        ];
        for (kind, expected) in cases {
            assert_eq!(kind.as_ref(), expected);
        }
    }

    #[test]
    fn test_counters_render() {
        let telemetry = Telemetry::new().unwrap();
        telemetry.request_served("200", "8080");
        telemetry.lines_unprocessed(3);
        telemetry.error(ErrorKind::BackendFetch);

        let rendered = telemetry.render().unwrap();
        assert!(rendered.contains(r#"label_proxy_requests_total{code="200",port="8080"} 1"#));
        assert!(rendered.contains("label_proxy_unprocessed_lines_total 3"));
        assert!(rendered.contains(r#"label_proxy_errors_total{kind="backend-fetch"} 1"#));
    }
}
