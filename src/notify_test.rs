use super::*;

// =============================================================
// Notice constructors
// =============================================================

#[test]
fn constructors_set_severity() {
    assert_eq!(Notice::success("ok").severity, Severity::Success);
    assert_eq!(Notice::warning("hm").severity, Severity::Warning);
    assert_eq!(Notice::error("no").severity, Severity::Error);
}

#[test]
fn louder_notices_linger_longer() {
    let success = Notice::success("ok").auto_dismiss;
    let warning = Notice::warning("hm").auto_dismiss;
    let error = Notice::error("no").auto_dismiss;
    assert!(success < warning);
    assert!(warning < error);
}

#[test]
fn log_sink_accepts_all_severities() {
    let sink = LogSink;
    sink.notify(Notice::success("ok"));
    sink.notify(Notice::warning("hm"));
    sink.notify(Notice::error("no"));
}
