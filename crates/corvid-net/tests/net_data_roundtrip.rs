use std::net::TcpStream;
use std::time::Duration;

use corvid_codec::NetData;
use corvid_net::{
    DataInOut, Mode, Socket, SocketClientParams, SocketParams, SocketServerParams, new_client, new_server,
};

fn wait_for_port(port: u16) {
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("server never started listening on port {port}");
}

#[test]
fn net_data_client_server_roundtrip_through_the_default_handler() {
    let server_params = SocketServerParams {
        common: SocketParams { addr: "127.0.0.1".to_string(), port: 24713, ..Default::default() },
        mode: Mode::NetData,
        ..Default::default()
    };
    let server = new_server(server_params);
    assert!(server.run().is_ok());
    wait_for_port(24713);

    let client_params = SocketClientParams {
        common: SocketParams { addr: "127.0.0.1".to_string(), port: 24713, ..Default::default() },
        ..Default::default()
    };
    let client = new_client(client_params);
    assert!(client.run().is_ok());

    let mut request = NetData::new();
    request.write(&7i32);
    request.finish_top_level_write();
    request.rewind();
    request.header.id = 0;

    let mut reply = NetData::new();
    let status = client.actor().request_nd(&mut request, &mut reply);
    assert!(status.is_ok(), "{status:?}");
    let value: i32 = reply.read().unwrap();
    assert_eq!(value, 7);

    client.terminate();
    server.terminate();
}

#[test]
fn net_data_server_falls_back_to_char_stream_on_non_framed_input() {
    let server_params = SocketServerParams {
        common: SocketParams { addr: "127.0.0.1".to_string(), port: 24714, ..Default::default() },
        mode: Mode::NetData,
        ..Default::default()
    };
    let server = new_server(server_params);
    assert!(server.run().is_ok());
    wait_for_port(24714);

    let stream = TcpStream::connect(("127.0.0.1", 24714)).unwrap();
    let mut socket = Socket::new(stream).unwrap();
    let status = socket.send(b"plain text, not NetData\0");
    assert!(status.is_ok());

    let mut data = corvid_core::Bytes::new();
    let mut scratch = [0u8; 256];
    let status = socket.recv_chars(&mut data, &mut scratch);
    assert!(status.is_ok());
    assert_eq!(data.data(), b"plain text, not NetData\0");

    server.terminate();
}

#[test]
fn net_data_server_dispatches_to_a_custom_registered_handler() {
    let server_params = SocketServerParams {
        common: SocketParams { addr: "127.0.0.1".to_string(), port: 24715, ..Default::default() },
        mode: Mode::NetData,
        ..Default::default()
    };
    let server = new_server(server_params);
    server.actor().register_handler(
        1,
        Box::new(|dio: DataInOut<'_>| {
            let name: String = dio.request.read().unwrap();
            dio.reply.write(&format!("hello, {name}"));
            dio.reply.finish_top_level_write();
            *dio.status = corvid_core::Status::ok();
        }),
    );
    assert!(server.run().is_ok());
    wait_for_port(24715);

    let client_params = SocketClientParams {
        common: SocketParams { addr: "127.0.0.1".to_string(), port: 24715, ..Default::default() },
        ..Default::default()
    };
    let client = new_client(client_params);
    assert!(client.run().is_ok());

    let mut request = NetData::new();
    request.write(&"Ada".to_string());
    request.finish_top_level_write();
    request.rewind();
    request.header.id = 1;

    let mut reply = NetData::new();
    let status = client.actor().request_nd(&mut request, &mut reply);
    assert!(status.is_ok(), "{status:?}");
    let value: String = reply.read().unwrap();
    assert_eq!(value, "hello, Ada");

    client.terminate();
    server.terminate();
}
