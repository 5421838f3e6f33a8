//! State-machine tests for a single connected client, driven over real
//! socket pairs with the library's own poller.

use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::Duration;

use mio::Token;

use jukebox::catalog::Catalog;
use jukebox::server::{Client, Disposition, Interest, Poller};

const TOKEN: Token = Token(1);

fn connected_client(poller: &mut Poller) -> (Client, std::net::TcpStream) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (accepted, peer_addr) = listener.accept().unwrap();
    accepted.set_nonblocking(true).unwrap();
    let mut stream = mio::net::TcpStream::from_std(accepted);
    poller
        .register(&mut stream, TOKEN, Interest::Readable)
        .unwrap();
    (Client::new(stream, TOKEN, peer_addr), peer)
}

fn spawn_reader(mut peer: std::net::TcpStream) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        peer.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        let mut buf = Vec::new();
        peer.read_to_end(&mut buf).unwrap();
        buf
    })
}

/// Pumps the poller and the client's handlers until the peer-side reader
/// has seen the end of the reply.
fn drive_until_finished(
    poller: &mut Poller,
    client: &mut Client,
    catalog: &Catalog,
    reader: &JoinHandle<Vec<u8>>,
) {
    for _ in 0..600 {
        if reader.is_finished() {
            return;
        }
        for event in poller.wait(Some(Duration::from_millis(100))).unwrap() {
            if event.readable {
                client.handle_readable(poller, catalog).unwrap();
            }
            if event.writable {
                client.handle_writable(poller).unwrap();
            }
        }
    }
    panic!("peer never saw the end of the reply");
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn test_list_reply_completes_without_write_interest() {
    let mut poller = Poller::new().unwrap();
    let (mut client, mut peer) = connected_client(&mut poller);
    let catalog = Catalog::from_paths(vec!["a.mp3".into(), "b.mp3".into()]);

    peer.write_all(b"list\n").unwrap();
    let reader = spawn_reader(peer);
    drive_until_finished(&mut poller, &mut client, &catalog, &reader);

    assert_eq!(reader.join().unwrap(), b"(0)\ta.mp3\n(1)\tb.mp3\n");
    assert!(!client.is_sending());
    assert_eq!(poller.interest(TOKEN), Some(Interest::Readable));
}

#[test]
fn test_out_of_range_play_sends_error_and_stays_receiving() {
    let mut poller = Poller::new().unwrap();
    let (mut client, mut peer) = connected_client(&mut poller);
    let catalog = Catalog::from_paths(vec!["a.mp3".into(), "b.mp3".into()]);

    peer.write_all(b"play 5\n").unwrap();
    let reader = spawn_reader(peer);
    drive_until_finished(&mut poller, &mut client, &catalog, &reader);

    assert_eq!(reader.join().unwrap(), b"no such track\n");
    assert!(!client.is_sending());
    assert_eq!(poller.interest(TOKEN), Some(Interest::Readable));
}

#[test]
fn test_unknown_command_is_ignored() {
    let mut poller = Poller::new().unwrap();
    let (mut client, mut peer) = connected_client(&mut poller);
    let catalog = Catalog::from_paths(vec!["a.mp3".into()]);

    // The bad command draws no reply and no state change; the follow-up
    // list on the same connection is served normally.
    peer.write_all(b"jump 3\nlist\n").unwrap();
    let reader = spawn_reader(peer);
    drive_until_finished(&mut poller, &mut client, &catalog, &reader);

    assert_eq!(reader.join().unwrap(), b"(0)\ta.mp3\n");
    assert!(!client.is_sending());
}

#[test]
fn test_large_play_parks_sender_then_resumes_to_completion() {
    let data = pattern(32 * 1024 * 1024);
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.mp3"), &data).unwrap();
    let catalog = Catalog::scan(dir.path()).unwrap();

    let mut poller = Poller::new().unwrap();
    let (mut client, peer) = connected_client(&mut poller);

    (&peer).write_all(b"play 0\n").unwrap();
    for _ in 0..100 {
        if client.is_sending() {
            break;
        }
        for event in poller.wait(Some(Duration::from_secs(5))).unwrap() {
            if event.readable {
                client.handle_readable(&mut poller, &catalog).unwrap();
            }
        }
    }

    // The reply cannot fit the socket buffers, so the sender is parked
    // and write interest added.
    assert!(client.is_sending());
    assert_eq!(poller.interest(TOKEN), Some(Interest::ReadableWritable));

    // Once the peer drains the stream, the reply runs to completion and
    // write interest is removed again.
    let reader = spawn_reader(peer);
    drive_until_finished(&mut poller, &mut client, &catalog, &reader);

    assert_eq!(reader.join().unwrap(), data);
    assert!(!client.is_sending());
    assert_eq!(poller.interest(TOKEN), Some(Interest::Readable));
}

#[test]
fn test_stop_mid_stream_returns_to_receiving() {
    let data = pattern(32 * 1024 * 1024);
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.mp3"), &data).unwrap();
    let catalog = Catalog::scan(dir.path()).unwrap();

    let mut poller = Poller::new().unwrap();
    let (mut client, mut peer) = connected_client(&mut poller);

    peer.write_all(b"play 0\n").unwrap();
    for _ in 0..100 {
        if client.is_sending() {
            break;
        }
        for event in poller.wait(Some(Duration::from_secs(5))).unwrap() {
            if event.readable {
                client.handle_readable(&mut poller, &catalog).unwrap();
            }
        }
    }
    assert!(client.is_sending());

    peer.write_all(b"stop\n").unwrap();
    for _ in 0..100 {
        if !client.is_sending() {
            break;
        }
        for event in poller.wait(Some(Duration::from_secs(5))).unwrap() {
            if event.readable {
                client.handle_readable(&mut poller, &catalog).unwrap();
            }
            if event.writable {
                client.handle_writable(&mut poller).unwrap();
            }
        }
    }

    // The sender is released and the connection is back to waiting for
    // commands, with write interest gone.
    assert!(!client.is_sending());
    assert_eq!(poller.interest(TOKEN), Some(Interest::Readable));

    // The peer sees an unbroken prefix of the track, then end-of-reply.
    peer.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let mut delivered = Vec::new();
    peer.read_to_end(&mut delivered).unwrap();
    assert!(delivered.len() < data.len());
    assert_eq!(delivered, &data[..delivered.len()]);
}

#[test]
fn test_peer_eof_closes_connection() {
    let mut poller = Poller::new().unwrap();
    let (mut client, peer) = connected_client(&mut poller);
    let catalog = Catalog::from_paths(Vec::new());

    drop(peer);

    let mut disposition = Disposition::KeepOpen;
    for _ in 0..100 {
        if disposition == Disposition::Close {
            break;
        }
        for event in poller.wait(Some(Duration::from_secs(5))).unwrap() {
            if event.readable {
                disposition = client.handle_readable(&mut poller, &catalog).unwrap();
            }
        }
    }
    assert_eq!(disposition, Disposition::Close);

    client.deregister(&mut poller).unwrap();
    assert!(client.deregister(&mut poller).is_err());
    assert_eq!(poller.interest(TOKEN), None);
}
