use std::env;

use sshagent::config::Config;
use sshagent::ssh1::{Action, Event, Ssh1LoginMachine};

/// Extracts username and hostname and prints the SSH-1 login machine's reaction to a
/// fabricated `SMSG_PUBLIC_KEY` packet. There is no real transport here — the BPP/socket
/// layer is out of scope — so this only demonstrates driving the state machine, the way
/// a connection layer's event loop would.
fn main() {
    let cmd_line: Vec<String> = env::args().collect();
    let Some(args) = parse_args(&cmd_line) else {
        std::process::exit(2);
    };

    let mut config = Config::default();
    config.remote_user = Some(args.username.to_string());

    let mut machine = Ssh1LoginMachine::new(config, Vec::new());
    let packet = sshagent::ssh1::Packet::new(2 /* SMSG_PUBLIC_KEY */, demo_public_key_body());

    match machine.step(Event::ServerPacket(packet)) {
        Ok(actions) => {
            for action in actions {
                print_action(&args.hostname, &action);
            }
        }
        Err(err) => eprintln!("ssh-1 login failed: {err}"),
    }
}

struct Args<'a> {
    username: &'a str,
    hostname: &'a str,
}

/// Reads the command line arguments and parses them into the argument struct, the way
/// a real client would before opening the connection to `hostname`.
fn parse_args(cmd_line: &[String]) -> Option<Args<'_>> {
    if cmd_line.len() != 2 {
        eprintln!("Invalid number of arguments: expected 1 found {}", cmd_line.len() - 1);
        return None;
    }

    let parts: Vec<&str> = cmd_line[1].split('@').collect();
    if parts.len() > 2 {
        eprintln!("Too many @ symbols in argument: Expected at most 1");
        return None;
    }
    if parts.len() == 2 {
        return Some(Args { username: parts[0], hostname: parts[1] });
    }
    Some(Args { username: "", hostname: parts[0] })
}

fn print_action(hostname: &str, action: &Action) {
    match action {
        Action::AskHostKeyDialog(fp) => {
            println!("{hostname}: confirm host key (e={}, n bits={})", fp.e, fp.n.bits());
        }
        Action::AskWeakCipherDialog(cipher) => println!("{hostname}: confirm weak cipher {cipher:?}"),
        Action::AskUserInput { prompt, .. } => println!("{hostname}: {prompt}"),
        Action::AskAgentIdentities => println!("{hostname}: requesting agent identities"),
        Action::AskAgentSign { .. } => println!("{hostname}: requesting agent signature"),
        Action::Send(packet) => println!("{hostname}: -> packet type {}", packet.msg_type),
        Action::Log(message) => println!("{hostname}: {message}"),
        Action::HandoffToConnectionLayer { local_protoflags } => {
            println!("{hostname}: login complete, handing off (protoflags={local_protoflags:#x})");
        }
    }
}

fn demo_public_key_body() -> Vec<u8> {
    use rsa::BigUint;
    use sshagent::wire;

    let mut body = Vec::new();
    body.extend_from_slice(&[0u8; 8]); // cookie
    wire::append_u32(&mut body, 512);
    wire::append_mpint1(&mut body, &BigUint::from(65537u32));
    wire::append_mpint1(&mut body, &BigUint::from(11u32));
    wire::append_u32(&mut body, 1024);
    wire::append_mpint1(&mut body, &BigUint::from(65537u32));
    wire::append_mpint1(&mut body, &BigUint::from(13u32));
    wire::append_u32(&mut body, 0);
    wire::append_u32(&mut body, 1 << 2); // 3DES supported
    wire::append_u32(&mut body, (1 << 2) | (1 << 3)); // RSA + password auth supported
    body
}
