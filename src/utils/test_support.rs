/// Returns true when the mock upstream cannot run because the sandbox
/// refuses loopback listeners.
pub fn should_skip_httpmock() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping upstream mock test: loopback bind denied");
            true
        }
        Err(err) => panic!("failed to probe loopback for mock upstream: {err}"),
    }
}
