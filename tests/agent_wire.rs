//! End-to-end exercise of the agent wire protocol over a real Unix socket
//! (`spec.md` §8, scenarios A, B, C, E).

use std::cell::RefCell;
use std::rc::Rc;

use ed25519_dalek::SigningKey;
use rand::RngCore;
use sshagent::agent::listener::Listener;
use sshagent::agent::protocol::{
    AGENT_MAX_MSGLEN, SSH2_AGENTC_ADD_IDENTITY, SSH2_AGENTC_REQUEST_IDENTITIES, SSH2_AGENTC_SIGN_REQUEST,
    SSH2_AGENT_IDENTITIES_ANSWER, SSH2_AGENT_SIGN_RESPONSE, SSH_AGENT_FAILURE,
};
use sshagent::agent::AgentCore;
use sshagent::wire;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

async fn send_frame(stream: &mut UnixStream, body: &[u8]) {
    stream.write_u32(body.len() as u32).await.unwrap();
    stream.write_all(body).await.unwrap();
}

async fn read_frame(stream: &mut UnixStream) -> Vec<u8> {
    let len = stream.read_u32().await.unwrap();
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.unwrap();
    body
}

fn ed25519_add_identity_body(signing: &SigningKey, comment: &str) -> Vec<u8> {
    let mut body = Vec::new();
    wire::append_string(&mut body, b"ssh-ed25519");
    let public = signing.verifying_key().to_bytes();
    let seed = signing.to_bytes();
    let mut private = Vec::with_capacity(64);
    private.extend_from_slice(&seed);
    private.extend_from_slice(&public);
    wire::append_string(&mut body, &public);
    wire::append_string(&mut body, &private);
    wire::append_string(&mut body, comment.as_bytes());
    body
}

fn ed25519_public_blob(signing: &SigningKey) -> Vec<u8> {
    let mut blob = Vec::new();
    wire::append_string(&mut blob, b"ssh-ed25519");
    wire::append_string(&mut blob, &signing.verifying_key().to_bytes());
    blob
}

async fn spawn_agent_and_connect() -> (UnixStream, tempfile::TempPath) {
    let socket_path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
    std::fs::remove_file(&socket_path).ok();
    let listener = Listener::bind(&socket_path).unwrap();
    let core = Rc::new(RefCell::new(AgentCore::new()));

    tokio::task::spawn_local(async move {
        listener.serve(core).await;
    });

    // give the listener task a chance to start accepting.
    tokio::task::yield_now().await;

    let stream = UnixStream::connect(&socket_path).await.unwrap();
    (stream, socket_path)
}

#[tokio::test]
async fn scenario_a_add_and_list_ed25519() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (mut stream, _path) = spawn_agent_and_connect().await;

            let mut seed_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed_bytes);
            let signing = SigningKey::from_bytes(&seed_bytes);

            let mut add_body = vec![SSH2_AGENTC_ADD_IDENTITY];
            add_body.extend_from_slice(&ed25519_add_identity_body(&signing, "demo@host"));
            send_frame(&mut stream, &add_body).await;
            let resp = read_frame(&mut stream).await;
            assert_eq!(resp, vec![6], "expected SSH_AGENT_SUCCESS");

            send_frame(&mut stream, &[SSH2_AGENTC_REQUEST_IDENTITIES]).await;
            let resp = read_frame(&mut stream).await;
            assert_eq!(resp[0], SSH2_AGENT_IDENTITIES_ANSWER);
            let mut r = wire::Reader::new(&resp[1..]);
            let count = r.take_u32().unwrap();
            assert_eq!(count, 1);
            let blob = r.take_string().unwrap();
            assert_eq!(blob, ed25519_public_blob(&signing));
        })
        .await;
}

#[tokio::test]
async fn scenario_b_duplicate_add_fails() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (mut stream, _path) = spawn_agent_and_connect().await;

            let mut seed_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed_bytes);
            let signing = SigningKey::from_bytes(&seed_bytes);
            let mut add_body = vec![SSH2_AGENTC_ADD_IDENTITY];
            add_body.extend_from_slice(&ed25519_add_identity_body(&signing, "demo@host"));

            send_frame(&mut stream, &add_body).await;
            let first = read_frame(&mut stream).await;
            assert_eq!(first, vec![6]);

            send_frame(&mut stream, &add_body).await;
            let second = read_frame(&mut stream).await;
            assert_eq!(second, vec![SSH_AGENT_FAILURE]);
        })
        .await;
}

#[tokio::test]
async fn scenario_c_sign_with_bad_flags_fails() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (mut stream, _path) = spawn_agent_and_connect().await;

            let mut seed_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed_bytes);
            let signing = SigningKey::from_bytes(&seed_bytes);
            let mut add_body = vec![SSH2_AGENTC_ADD_IDENTITY];
            add_body.extend_from_slice(&ed25519_add_identity_body(&signing, "demo@host"));
            send_frame(&mut stream, &add_body).await;
            assert_eq!(read_frame(&mut stream).await, vec![6]);

            // ed25519 keys support no sign-request flags; 0x02 must be rejected.
            let mut sign_body = vec![SSH2_AGENTC_SIGN_REQUEST];
            wire::append_string(&mut sign_body, &ed25519_public_blob(&signing));
            wire::append_string(&mut sign_body, b"some data to sign");
            wire::append_u32(&mut sign_body, 0x02);
            send_frame(&mut stream, &sign_body).await;
            let resp = read_frame(&mut stream).await;
            assert_eq!(resp, vec![SSH_AGENT_FAILURE]);

            // flags=0 must succeed.
            let mut sign_body = vec![SSH2_AGENTC_SIGN_REQUEST];
            wire::append_string(&mut sign_body, &ed25519_public_blob(&signing));
            wire::append_string(&mut sign_body, b"some data to sign");
            wire::append_u32(&mut sign_body, 0);
            send_frame(&mut stream, &sign_body).await;
            let resp = read_frame(&mut stream).await;
            assert_eq!(resp[0], SSH2_AGENT_SIGN_RESPONSE);
        })
        .await;
}

#[tokio::test]
async fn scenario_e_overlong_message_gets_failure_without_closing() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (mut stream, _path) = spawn_agent_and_connect().await;

            let oversized_len = AGENT_MAX_MSGLEN; // exceeds AGENT_MAX_MSGLEN - 4
            stream.write_u32(oversized_len).await.unwrap();
            stream.write_all(&vec![0u8; oversized_len as usize]).await.unwrap();

            let resp = read_frame(&mut stream).await;
            assert_eq!(resp, vec![SSH_AGENT_FAILURE]);

            // the connection must still be usable afterwards.
            send_frame(&mut stream, &[SSH2_AGENTC_REQUEST_IDENTITIES]).await;
            let resp = read_frame(&mut stream).await;
            assert_eq!(resp[0], SSH2_AGENT_IDENTITIES_ANSWER);
        })
        .await;
}
