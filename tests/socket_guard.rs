use netmux::socket::{AsSocket, close, make_socket_guard, stream_socket_pair};

#[test]
fn guard_closes_on_drop() {
    let (first, second) = stream_socket_pair().unwrap();
    {
        let _guard = make_socket_guard(first);
    }
    // The guarded end is closed: writes fail and the peer reads EOF.
    let mut data = [0u8; 1];
    assert!(first.write(&data).is_err());
    assert_eq!(second.read(&mut data).unwrap(), 0);
    close(second.as_socket());
}

#[test]
fn release_keeps_socket_usable() {
    let (first, second) = stream_socket_pair().unwrap();
    {
        let guard = make_socket_guard(first);
        let sock = guard.release();
        assert_eq!(sock, first);
    }
    let mut data = [0u8; 1];
    assert_eq!(first.write(&data).unwrap(), 1);
    assert_eq!(second.read(&mut data).unwrap(), 1);
    close(first.as_socket());
    close(second.as_socket());
}
