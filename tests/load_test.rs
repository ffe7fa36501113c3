//! Load and concurrency testing for the REST server.

use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_load_performance() {
    let server = common::start_server(vec![]).await;

    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let start = Instant::now();
    let mut handles = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let client = common::client();
        let url = server.url("/ping");
        handles.push(tokio::spawn(async move {
            let mut ok = 0;
            for _ in 0..requests_per_task {
                if let Ok(res) = client.get(&url).send().await {
                    if res.status() == 200 {
                        ok += 1;
                    }
                }
            }
            ok
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        succeeded += handle.await.unwrap();
    }
    let elapsed = start.elapsed();

    println!(
        "{} requests in {:?} ({:.0} req/s)",
        total_requests,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64()
    );
    assert_eq!(succeeded, total_requests);

    server.stop().await;
}

#[tokio::test]
async fn test_slow_handler_does_not_block_others() {
    let server = common::start_server(vec![]).await;
    let client = common::client();

    let slow_url = server.url("/slow");
    let slow_client = client.clone();
    let slow = tokio::spawn(async move {
        slow_client.get(&slow_url).send().await.unwrap().text().await.unwrap()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    let res = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(start.elapsed() < Duration::from_millis(250));

    assert_eq!(slow.await.unwrap(), "\"finally\"");
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_requests_finish() {
    let server = common::start_server(vec![]).await;

    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move {
        common::client().get(&url).send().await.unwrap().text().await.unwrap()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let addr = server.addr;
    server.stop().await;

    assert_eq!(in_flight.await.unwrap(), "\"finally\"");
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
