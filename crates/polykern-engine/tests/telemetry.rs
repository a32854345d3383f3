use polykern_engine::telemetry::init_tracing;

#[test]
fn second_install_is_refused() {
    let _ = init_tracing();
    assert!(!init_tracing());
}
