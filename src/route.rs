//! Request path routing: `{port}[/subpath]`.

/// Split a request path (without its leading `/`) into the backend port and
/// the subpath to fetch from it. The port segment must be all digits; the
/// subpath keeps its leading `/` and may be empty.
///
/// This is the only request validation gate before a backend fetch is
/// attempted: on `None` the caller responds not-found and never contacts a
/// backend.
///
/// Examples:
/// * `8080/metrics` → `("8080", "/metrics")`
/// * `8080` → `("8080", "")`
pub fn parse_port_path(path: &str) -> Option<(&str, &str)> {
    let (port, subpath) = match path.find('/') {
        Some(idx) => path.split_at(idx),
        None => (path, ""),
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((port, subpath))
}
