// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::io::Read;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use katalog_app::{
    BookId, DatasetKind, DeleteRequest, EditDraft, LibraryId, LookupKind, WriteMethod,
    WriteRequest,
};
use katalog_client::Client;
use katalog_testkit::{records_json, sample_books};
use serde_json::{Value, json};
use tiny_http::{Header, Response, Server};

fn json_header() -> Header {
    Header::from_bytes("Content-Type", "application/json").expect("valid content type header")
}

#[test]
fn unreachable_server_error_is_actionable() {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50))
        .expect("client should initialize");

    let error = client
        .fetch_dataset(DatasetKind::Books)
        .expect_err("fetch should fail for unreachable endpoint");
    assert_eq!(error.status, None);
    assert!(error.message.contains("cannot reach"));
}

#[test]
fn fetch_dataset_keeps_server_key_order() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());
    let body = records_json(&sample_books());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/books");
        assert_eq!(request.method().as_str(), "GET");
        let response = Response::from_string(body)
            .with_status_code(200)
            .with_header(json_header());
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let records = client.fetch_dataset(DatasetKind::Books)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text("author"), "Иванов");
    assert_eq!(
        records[0].columns().collect::<Vec<_>>(),
        vec!["title", "author", "book_id", "genre_id", "library_id", "quantity"]
    );

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn lookup_paths_carry_ids() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}/api", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/api/book-topics/1/5");
        let response = Response::from_string(r#"[{"topic_id": 2, "name": "Война"}]"#)
            .with_status_code(200)
            .with_header(json_header());
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let topics = client.fetch_lookup(LookupKind::BookTopics {
        library_id: LibraryId::new(1),
        book_id: BookId::new(5),
    })?;
    assert_eq!(topics[0].text("name"), "Война");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn missing_book_delete_surfaces_server_message() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/delete/book/1/5");
        assert_eq!(request.method().as_str(), "DELETE");
        let response = Response::from_string(r#"{"error": "Книга не найдена"}"#)
            .with_status_code(404)
            .with_header(json_header());
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let delete = DeleteRequest::Book {
        library_id: LibraryId::new(1),
        book_id: BookId::new(5),
    };
    let error = client
        .send(&delete.to_write())
        .expect_err("missing book should be reported");
    assert_eq!(error.status, Some(404));
    assert_eq!(error.to_string(), "Книга не найдена");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn by_name_delete_encodes_the_name_as_one_segment() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(
            request.url(),
            "/delete/reader/by-name/%D0%9E%D0%BB%D0%B5%D0%B3%20A%2FB"
        );
        request
            .respond(Response::from_string("{}").with_header(json_header()))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let delete = DeleteRequest::ReaderByName {
        full_name: "Олег A/B".to_owned(),
    };
    client.send(&delete.to_write())?;

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn send_all_posts_bodies_in_order_and_stops_at_first_failure() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for status in [200, 409] {
            let mut request = server.recv().expect("request expected");
            assert_eq!(request.url(), "/add/book-topic");
            assert_eq!(request.method().as_str(), "POST");
            let mut body = String::new();
            request
                .as_reader()
                .read_to_string(&mut body)
                .expect("body should read");
            seen.push(serde_json::from_str::<Value>(&body).expect("json body"));
            let reply = if status == 200 {
                "{}"
            } else {
                r#"{"error": "Тема уже назначена"}"#
            };
            let response = Response::from_string(reply)
                .with_status_code(status)
                .with_header(json_header());
            request.respond(response).expect("response should succeed");
        }
        seen
    });

    let writes: Vec<WriteRequest> = [1, 2, 3]
        .into_iter()
        .map(|topic_id| {
            WriteRequest::new(
                WriteMethod::Post,
                &["add", "book-topic"],
                Some(json!({"library_id": 1, "book_id": 5, "topic_id": topic_id})),
            )
        })
        .collect();

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let error = client
        .send_all(&writes)
        .expect_err("second write should fail");
    assert_eq!(error.to_string(), "Тема уже назначена");
    assert_eq!(error.applied, 1);
    assert_eq!(error.error.status, Some(409));

    let seen = handle.join().expect("server thread should join");
    assert_eq!(
        seen,
        vec![
            json!({"library_id": 1, "book_id": 5, "topic_id": 1}),
            json!({"library_id": 1, "book_id": 5, "topic_id": 2}),
        ]
    );
    Ok(())
}

#[test]
fn edit_sends_row_key_under_row_data() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.url(), "/edit/books");
        assert_eq!(request.method().as_str(), "PUT");
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("body should read");
        request
            .respond(Response::from_string("{}").with_header(json_header()))
            .expect("response should succeed");
        serde_json::from_str::<Value>(&body).expect("json body")
    });

    let books = sample_books();
    let mut draft = EditDraft::open(DatasetKind::Books, &books[0], "title")?;
    draft.set_input("A2");
    let client = Client::new(&addr, Duration::from_secs(1))?;
    client.send(&draft.request()?.to_write())?;

    let body = handle.join().expect("server thread should join");
    assert_eq!(
        body,
        json!({"column": "title", "value": "A2", "rowData": {"library_id": 1, "book_id": 1}})
    );
    Ok(())
}

#[test]
fn server_errors_without_envelope_fall_back_to_status() -> Result<()> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        let response =
            Response::from_string("<h1>Internal Server Error</h1>").with_status_code(500);
        request.respond(response).expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let error = client
        .fetch_dataset(DatasetKind::Loans)
        .expect_err("500 should fail");
    assert_eq!(error.to_string(), "server returned 500");

    handle.join().expect("server thread should join");
    Ok(())
}
