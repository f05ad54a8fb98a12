//! End-to-end routing scenarios: a real loopback socket pair driven through
//! `HttpConnection::{read_once, try_parse_and_dispatch, write_ready}` against a document root
//! populated with the pages the routing table names, exercising the login/register CGI flow
//! against a real `CredentialPool`.

use server_proxy::cred_pool::CredentialPool;
use server_proxy::prelude::*;
use server_proxy::process_config::Trigger;
use std::fs;
use std::net::{TcpListener as StdListener, TcpStream as StdStream};
use std::sync::atomic::{AtomicU64, Ordering};

fn loopback_pair() -> (TcpStream, StdStream) {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = StdStream::connect(addr).unwrap();
    let (server, _peer) = listener.accept().unwrap();
    server.set_nonblocking(true).unwrap();
    (TcpStream::from_std(server), client)
}

fn doc_root_with_pages(pages: &[(&str, &str)]) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "server_proxy_router_test_{}_{}",
        std::process::id(),
        n
    ));
    fs::create_dir_all(&dir).unwrap();
    for (name, body) in pages {
        fs::write(dir.join(name), body.as_bytes()).unwrap();
    }
    dir
}

fn users_file(pairs: &[(&str, &str)]) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "server_proxy_router_test_users_{}_{}.txt",
        std::process::id(),
        n
    ));
    let body: String = pairs.iter().map(|(u, p)| format!("{}:{}\n", u, p)).collect();
    fs::write(&path, body).unwrap();
    path
}

/// Sends `request` over a fresh loopback connection, drives it through the full
/// read/dispatch/write cycle and returns whatever bytes came back to the client.
fn fetch(request: &[u8], pool: &CredentialPool, root: &Path) -> String {
    let (server, mut client) = loopback_pair();
    let peer = server.peer_addr().unwrap();
    let mut conn = HttpConnection::new(server, peer);

    client.write_all(request).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    conn.read_once(Trigger::LevelTriggered);
    assert!(conn.try_parse_and_dispatch(pool, root));
    assert_eq!(conn.write_ready(), WriteOutcome::Done);

    client.set_nonblocking(false).unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).unwrap_or(0);
    String::from_utf8_lossy(&out).to_string()
}

fn cgi_request(tag: char, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "POST /{}CGISQL.cgi HTTP/1.1\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        tag,
        body.len()
    );
    let mut full = head.into_bytes();
    full.extend_from_slice(body);
    full
}

#[test]
fn tag_0_and_1_serve_register_and_log_pages() {
    let root = doc_root_with_pages(&[
        ("register.html", "register page"),
        ("log.html", "log page"),
    ]);
    let pool = CredentialPool::init(2, users_file(&[]).to_str().unwrap()).unwrap();

    let out = fetch(b"GET /0 HTTP/1.1\r\nConnection: close\r\n\r\n", &pool, &root);
    assert!(out.ends_with("register page"));

    let out = fetch(b"GET /1 HTTP/1.1\r\nConnection: close\r\n\r\n", &pool, &root);
    assert!(out.ends_with("log page"));
}

#[test]
fn login_flow_rejects_unknown_then_succeeds_for_seeded_user() {
    let root = doc_root_with_pages(&[
        ("welcome.html", "welcome"),
        ("logError.html", "bad login"),
    ]);
    let pool = CredentialPool::init(2, users_file(&[("alice", "secret")]).to_str().unwrap()).unwrap();

    let out = fetch(&cgi_request('2', b"user=alice&password=wrong"), &pool, &root);
    assert!(out.ends_with("bad login"));

    let out = fetch(&cgi_request('2', b"user=alice&password=secret"), &pool, &root);
    assert!(out.ends_with("welcome"));
}

#[test]
fn register_flow_then_duplicate_register_fails() {
    let root = doc_root_with_pages(&[
        ("log.html", "please log in"),
        ("registerError.html", "user already exists"),
    ]);
    let pool = CredentialPool::init(2, users_file(&[]).to_str().unwrap()).unwrap();

    let out = fetch(&cgi_request('3', b"user=carol&password=newpass"), &pool, &root);
    assert!(out.ends_with("please log in"));

    let out = fetch(&cgi_request('3', b"user=carol&password=anything"), &pool, &root);
    assert!(out.ends_with("user already exists"));
}

#[test]
fn malformed_login_body_is_bad_request_not_a_panic() {
    let root = doc_root_with_pages(&[]);
    let pool = CredentialPool::init(2, users_file(&[]).to_str().unwrap()).unwrap();

    let out = fetch(&cgi_request('2', b"garbage-not-kv"), &pool, &root);
    assert!(out.contains("400"));
}

#[test]
fn media_tags_serve_their_fixed_pages() {
    let root = doc_root_with_pages(&[
        ("picture.html", "pictures"),
        ("video.html", "videos"),
        ("fans.html", "fans"),
    ]);
    let pool = CredentialPool::init(2, users_file(&[]).to_str().unwrap()).unwrap();

    for (tag, expected) in [("/5", "pictures"), ("/6", "videos"), ("/7", "fans")] {
        let req = format!("GET {} HTTP/1.1\r\nConnection: close\r\n\r\n", tag);
        let out = fetch(req.as_bytes(), &pool, &root);
        assert!(out.ends_with(expected));
    }
}

#[test]
fn unknown_tag_falls_through_to_raw_document_lookup() {
    let root = doc_root_with_pages(&[("style.css", "body{}")]);
    let pool = CredentialPool::init(2, users_file(&[]).to_str().unwrap()).unwrap();

    let out = fetch(
        b"GET /style.css HTTP/1.1\r\nConnection: close\r\n\r\n",
        &pool,
        &root,
    );
    assert!(out.ends_with("body{}"));
}
