mod support;

use std::time::Duration;

use respite::{cmd, ConnectionAddr, ErrorKind, PipelinedConnection, Value};

use support::{bulk, ok, MockServer, ServerReply};

#[tokio::test]
async fn set_then_get_round_trip() {
    let server = MockServer::start(|command| {
        match support::command_args(&command)
            .first()
            .map(String::as_str)
        {
            Some("SET") => ok(),
            Some("GET") => ServerReply::Value(bulk("bar")),
            _ => ServerReply::Raw(b"-ERR unknown command\r\n".to_vec()),
        }
    })
    .await;

    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    cmd("SET").arg("foo").arg("bar").exec_async(&con).await.unwrap();
    let value: Vec<u8> = cmd("GET").arg("foo").query_async(&con).await.unwrap();
    assert_eq!(value, b"bar".to_vec());

    assert_eq!(
        server.received(),
        vec![
            vec!["SET".to_string(), "foo".to_string(), "bar".to_string()],
            vec!["GET".to_string(), "foo".to_string()],
        ]
    );
}

#[tokio::test]
async fn get_of_missing_key_is_none() {
    let server =
        MockServer::start(|_| ServerReply::Value(Value::NullBulkString)).await;
    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    let value: Option<Vec<u8>> = cmd("GET").arg("missing").query_async(&con).await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn pipelined_replies_resolve_in_submission_order() {
    // The server stays silent until the third command arrives, then
    // answers all three in a single write, the way a busy server flushes
    // pipelined replies in one TCP segment.
    let mut seen = 0;
    let server = MockServer::start(move |_| {
        seen += 1;
        if seen == 3 {
            ServerReply::Raw(b":1\r\n:2\r\n:3\r\n".to_vec())
        } else {
            ServerReply::Ignore
        }
    })
    .await;

    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    // join! polls in declaration order, so the requests enter the queue
    // in this order even though their replies arrive in one segment.
    let first = async { cmd("INCR").arg("k").query_async::<i64>(&con).await };
    let second = async { cmd("INCR").arg("k").query_async::<i64>(&con).await };
    let third = async { cmd("INCR").arg("k").query_async::<i64>(&con).await };
    let (first, second, third) = tokio::join!(first, second, third);

    assert_eq!(first.unwrap(), 1);
    assert_eq!(second.unwrap(), 2);
    assert_eq!(third.unwrap(), 3);
}

#[tokio::test]
async fn concurrent_callers_each_get_their_reply() {
    // Echo the key back so a mismatched reply would be visible.
    let server = MockServer::start(|command| {
        let args = support::command_args(&command);
        ServerReply::Value(bulk(&args[1]))
    })
    .await;

    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let con = con.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("key-{i}");
            let value: String = cmd("GET").arg(&key).query_async(&con).await.unwrap();
            assert_eq!(value, key);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn wrongtype_reply_is_classified() {
    let server = MockServer::start(|_| {
        ServerReply::Raw(
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_vec(),
        )
    })
    .await;
    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    let err = cmd("LPUSH")
        .arg("stringkey")
        .arg("x")
        .query_async::<i64>(&con)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongType);
}

#[tokio::test]
async fn outstanding_calls_fail_and_connection_recovers() {
    // First command: the server hangs up without replying. Afterwards it
    // serves normally again.
    let mut calls = 0;
    let server = MockServer::start(move |_| {
        calls += 1;
        if calls == 1 {
            ServerReply::CloseConnection
        } else {
            ServerReply::Value(Value::SimpleString("PONG".to_string()))
        }
    })
    .await;

    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    let err = cmd("PING").query_async::<String>(&con).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);

    // The driver reconnects on its own; the next call goes through.
    let pong: String = cmd("PING").query_async(&con).await.unwrap();
    assert_eq!(pong, "PONG");
}

#[tokio::test]
async fn close_fails_pending_calls() {
    let server = MockServer::start(|_| ServerReply::Ignore).await;
    let con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();

    let pending = {
        let con = con.clone();
        tokio::spawn(async move { cmd("PING").query_async::<String>(&con).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    con.close();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);

    let err = cmd("PING").query_async::<String>(&con).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);
}

#[tokio::test]
async fn response_timeout_surfaces_as_timeout_error() {
    let server = MockServer::start(|_| ServerReply::Ignore).await;
    let mut con = PipelinedConnection::connect(server.addr.clone()).await.unwrap();
    con.set_response_timeout(Duration::from_millis(50));

    let err = cmd("PING").query_async::<String>(&con).await.unwrap_err();
    assert!(err.is_timeout(), "expected a timeout, got {err}");
}

#[tokio::test]
async fn connect_failure_surfaces_immediately() {
    // Nothing listens on this port; binding and dropping a listener is
    // the portable way to find a free one.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = PipelinedConnection::connect(ConnectionAddr::new("127.0.0.1", port))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);
}
