use netmux::V4Endpoint;
use netmux::socket::{
    AsSocket, close, make_connected_tcp_stream_socket, make_tcp_accept_socket,
};

#[test]
fn accept_and_exchange() {
    let (acceptor, port) = make_tcp_accept_socket(V4Endpoint::localhost(0), 128).unwrap();
    assert_ne!(port, 0);

    // Dial the learned port, then accept the connection.
    let dialed = make_connected_tcp_stream_socket(V4Endpoint::localhost(port)).unwrap();
    let accepted = acceptor.accept().unwrap();

    let data = [0u8; 10];
    assert_eq!(dialed.as_stream().write(&data).unwrap(), data.len());

    let mut buf = [0u8; 10];
    let mut got = 0;
    while got < buf.len() {
        let n = accepted.as_stream().read(&mut buf[got..]).unwrap();
        assert_ne!(n, 0, "peer closed early");
        got += n;
    }
    assert_eq!(got, 10);

    close(dialed.as_socket());
    close(accepted.as_socket());
    close(acceptor.as_socket());
}

#[test]
fn dial_refused_port_fails() {
    // Bind and immediately close to get a port nobody listens on.
    let (acceptor, port) = make_tcp_accept_socket(V4Endpoint::localhost(0), 1).unwrap();
    close(acceptor.as_socket());
    assert!(make_connected_tcp_stream_socket(V4Endpoint::localhost(port)).is_err());
}
