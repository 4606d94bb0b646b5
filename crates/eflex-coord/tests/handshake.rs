//! Registry/worker handshake over localhost.

use std::time::Duration;

use eflex_core::UnitId;

use eflex_coord::{CoordError, Registry, Worker, WorkerConfig, WorkerState};

fn worker_config(registry_addr: String, name: &str) -> WorkerConfig {
    WorkerConfig {
        registry_addr,
        name: name.to_string(),
        units: vec![UnitId::new(0)],
        periods: vec![1, 2],
        phone_book_wait: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn two_workers_receive_the_same_phone_book() {
    let registry = Registry::bind("127.0.0.1:0", 2).await.unwrap();
    let addr = registry.local_addr().unwrap().to_string();
    let registry_task = tokio::spawn(registry.run());

    let mut first = Worker::new(worker_config(addr.clone(), "w0"));
    let mut second = Worker::new(worker_config(addr, "w1"));
    assert_eq!(first.state(), WorkerState::Registering);

    let (book_a, book_b) = tokio::join!(first.join(7001), second.join(7002));
    let book_a = book_a.unwrap();
    let book_b = book_b.unwrap();

    assert_eq!(first.state(), WorkerState::Ready);
    assert_eq!(second.state(), WorkerState::Ready);
    assert_eq!(book_a, book_b);
    assert_eq!(book_a.len(), 2);
    let ports: Vec<bool> = book_a
        .iter()
        .map(|e| e.address.ends_with(":7001") || e.address.ends_with(":7002"))
        .collect();
    assert!(ports.iter().all(|&p| p), "{book_a:?}");

    let served = registry_task.await.unwrap().unwrap();
    assert_eq!(served, book_a);
}

#[tokio::test]
async fn stray_connections_do_not_take_the_registry_down() {
    // A port scanner or a confused client connects first: one socket that
    // closes without a word, one that sends garbage. Both real workers
    // must still be served.
    let registry = Registry::bind("127.0.0.1:0", 2).await.unwrap();
    let addr = registry.local_addr().unwrap().to_string();
    let registry_task = tokio::spawn(registry.run());

    {
        use tokio::io::AsyncWriteExt;
        let silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
        drop(silent);
        let mut noisy = tokio::net::TcpStream::connect(&addr).await.unwrap();
        noisy.write_all(b"hello registry\n").await.unwrap();
        noisy.flush().await.unwrap();
    }

    let mut first = Worker::new(worker_config(addr.clone(), "w0"));
    let mut second = Worker::new(worker_config(addr, "w1"));
    let (book_a, book_b) = tokio::join!(first.join(7003), second.join(7004));
    let book_a = book_a.unwrap();
    assert_eq!(book_a, book_b.unwrap());
    assert_eq!(book_a.len(), 2);

    let served = registry_task.await.unwrap().unwrap();
    assert_eq!(served, book_a);
}

#[tokio::test]
async fn worker_times_out_without_a_registry_answer() {
    // Registry expects two workers but only one ever shows up, so the
    // phone book never goes out.
    let registry = Registry::bind("127.0.0.1:0", 2).await.unwrap();
    let addr = registry.local_addr().unwrap().to_string();
    let _registry_task = tokio::spawn(registry.run());

    let mut config = worker_config(addr, "lonely");
    config.phone_book_wait = Duration::from_millis(200);
    let mut worker = Worker::new(config);

    let err = worker.join(7001).await.unwrap_err();
    assert!(matches!(err, CoordError::PhoneBookTimeout { .. }));
    assert_eq!(worker.state(), WorkerState::AwaitingPhoneBook);
}
