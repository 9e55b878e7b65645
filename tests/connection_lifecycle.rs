//! Connection lifecycle tests.
//!
//! Runs the `sopel` binary against a scripted server and checks
//! registration, capability negotiation, SASL, CTCP and reconnection.

mod common;

use common::{FakeServer, TestBot};
use std::time::Duration;

#[tokio::test]
async fn test_registration_and_autojoin() {
    let server = FakeServer::bind().await.expect("bind");
    let _bot = TestBot::spawn(server.port(), "").expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    let burst = conn.expect_registration().await.expect("registration burst");
    assert_eq!(
        burst,
        vec![
            "CAP LS 302",
            "NICK TestBot",
            "USER sopel 0 * :Sopel: https://sopel.chat/",
        ]
    );

    let requested = conn
        .negotiate("TestBot", "multi-prefix away-notify unknown-cap")
        .await
        .expect("negotiation");
    assert_eq!(requested, vec!["multi-prefix", "away-notify"]);

    let lines = conn.welcome("TestBot", "#test").await.expect("welcome");
    assert_eq!(lines, vec!["MODE TestBot +B", "JOIN #test"]);

    conn.send_raw("PING :irc.test").await.expect("send ping");
    let pong = conn
        .recv_until(|line| line.starts_with("PONG"))
        .await
        .expect("pong");
    assert_eq!(pong.last().map(String::as_str), Some("PONG irc.test"));
}

#[tokio::test]
async fn test_own_join_requests_channel_modes() {
    let server = FakeServer::bind().await.expect("bind");
    let _bot = TestBot::spawn(server.port(), "").expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    conn.expect_registration().await.expect("registration burst");
    conn.negotiate("TestBot", "").await.expect("negotiation");
    conn.welcome("TestBot", "#test").await.expect("welcome");

    conn.send_raw(":TestBot!sopel@127.0.0.1 JOIN #test")
        .await
        .expect("send join");
    let line = conn.recv_line().await.expect("mode request");
    assert_eq!(line, "MODE #test");
}

#[tokio::test]
async fn test_ctcp_version() {
    let server = FakeServer::bind().await.expect("bind");
    let _bot = TestBot::spawn(server.port(), "").expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    conn.expect_registration().await.expect("registration burst");
    conn.negotiate("TestBot", "").await.expect("negotiation");
    conn.welcome("TestBot", "#test").await.expect("welcome");

    conn.send_raw(":Alice!alice@example.com PRIVMSG TestBot :\x01VERSION\x01")
        .await
        .expect("send ctcp");
    let msg = conn.recv().await.expect("version reply");
    assert_eq!(msg.command, "NOTICE");
    assert_eq!(msg.params.first().map(String::as_str), Some("Alice"));
    let text = msg.params.last().cloned().unwrap_or_default();
    assert!(text.starts_with("\x01VERSION Sopel "), "got {:?}", text);
}

#[tokio::test]
async fn test_help_command() {
    let server = FakeServer::bind().await.expect("bind");
    let _bot = TestBot::spawn(server.port(), "owner = \"Admin\"").expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    conn.expect_registration().await.expect("registration burst");
    conn.negotiate("TestBot", "").await.expect("negotiation");
    conn.welcome("TestBot", "#test").await.expect("welcome");

    conn.send_raw(":Alice!alice@example.com PRIVMSG #test :.help")
        .await
        .expect("send help");
    let line = conn.recv_line().await.expect("help reply");
    assert_eq!(
        line,
        "PRIVMSG #test :Alice: Commands I recognise: commands, help. \
         For help, do '.help <command>'. My owner is Admin."
    );
}

#[tokio::test]
async fn test_sasl_plain() {
    let server = FakeServer::bind().await.expect("bind");
    let extra = "auth_method = \"sasl\"\nauth_password = \"secret\"";
    let _bot = TestBot::spawn(server.port(), extra).expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    conn.expect_registration().await.expect("registration burst");
    conn.send_raw(":irc.test CAP * LS :sasl=PLAIN,EXTERNAL")
        .await
        .expect("send ls");
    assert_eq!(conn.recv_line().await.expect("req"), "CAP REQ :sasl");

    conn.send_raw(":irc.test CAP TestBot ACK :sasl")
        .await
        .expect("send ack");
    assert_eq!(conn.recv_line().await.expect("mechanism"), "AUTHENTICATE PLAIN");

    conn.send_raw("AUTHENTICATE +").await.expect("send challenge");
    assert_eq!(
        conn.recv_line().await.expect("response"),
        "AUTHENTICATE VGVzdEJvdABUZXN0Qm90AHNlY3JldA=="
    );

    conn.send_raw(":irc.test 900 TestBot TestBot!sopel@127.0.0.1 TestBot :You are now logged in as TestBot")
        .await
        .expect("send 900");
    conn.send_raw(":irc.test 903 TestBot :SASL authentication successful")
        .await
        .expect("send 903");
    assert_eq!(conn.recv_line().await.expect("end"), "CAP END");

    let lines = conn.welcome("TestBot", "#test").await.expect("welcome");
    assert_eq!(lines, vec!["MODE TestBot +B", "JOIN #test"]);
}

#[tokio::test]
async fn test_sasl_failure_quits() {
    let server = FakeServer::bind().await.expect("bind");
    let extra = "auth_method = \"sasl\"\nauth_password = \"wrong\"";
    let _bot = TestBot::spawn(server.port(), extra).expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    conn.expect_registration().await.expect("registration burst");
    conn.send_raw(":irc.test CAP * LS :sasl").await.expect("send ls");
    assert_eq!(conn.recv_line().await.expect("req"), "CAP REQ :sasl");
    conn.send_raw(":irc.test CAP TestBot ACK :sasl")
        .await
        .expect("send ack");
    assert_eq!(conn.recv_line().await.expect("mechanism"), "AUTHENTICATE PLAIN");
    conn.send_raw("AUTHENTICATE +").await.expect("send challenge");
    conn.recv_line().await.expect("response");

    conn.send_raw(":irc.test 904 TestBot :SASL authentication failed")
        .await
        .expect("send 904");
    let lines = conn
        .recv_until(|line| line.starts_with("QUIT"))
        .await
        .expect("quit");
    assert_eq!(lines, vec!["CAP END", "QUIT :SASL Auth Failed"]);
}

#[tokio::test]
async fn test_nick_in_use_before_registration() {
    let server = FakeServer::bind().await.expect("bind");
    let _bot = TestBot::spawn(server.port(), "").expect("spawn bot");
    let mut conn = server.accept().await.expect("bot should connect");

    conn.expect_registration().await.expect("registration burst");
    conn.send_raw(":irc.test 433 * TestBot :Nickname is already in use")
        .await
        .expect("send 433");
    assert_eq!(conn.recv_line().await.expect("new nick"), "NICK TestBot_");
}

#[tokio::test]
async fn test_reconnect_after_server_close() {
    let server = FakeServer::bind().await.expect("bind");
    let mut bot = TestBot::spawn(server.port(), "").expect("spawn bot");

    {
        let mut conn = server.accept().await.expect("first connection");
        conn.expect_registration().await.expect("registration burst");
        conn.negotiate("TestBot", "").await.expect("negotiation");
        conn.welcome("TestBot", "#test").await.expect("welcome");
        conn.send_raw("ERROR :Closing Link: 127.0.0.1 (Server shutdown)")
            .await
            .expect("send error");
    }

    let mut conn = server
        .accept_timeout(Duration::from_secs(10))
        .await
        .expect("bot should reconnect");
    let burst = conn.expect_registration().await.expect("second registration");
    assert_eq!(burst.first().map(String::as_str), Some("CAP LS 302"));
    assert!(bot.wait_exit(1).is_none(), "bot should still be running");
}

#[tokio::test]
async fn test_sasl_without_password_refuses_to_start() {
    let server = FakeServer::bind().await.expect("bind");
    let mut bot = TestBot::spawn(server.port(), "auth_method = \"sasl\"").expect("spawn bot");
    let status = bot.wait_exit(10).expect("bot should exit");
    assert!(!status.success());
}
