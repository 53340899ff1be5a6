// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use katalog_app::{
    DatasetKind, FetchRequest, LookupKind, LookupRequest, Record, RemoteError, WriteBatch,
    WriteFailure, WriteRequest,
};
use katalog_client::Client;
use katalog_tui::{AppRuntime, InternalEvent};
use std::sync::mpsc::Sender;
use std::thread;

/// Runs every backend call on its own short-lived thread so the grid keeps
/// drawing. Outcomes come back over the loop's channel.
pub struct ClientRuntime {
    client: Client,
}

impl ClientRuntime {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl AppRuntime for ClientRuntime {
    fn load_dataset(&mut self, kind: DatasetKind) -> Result<Vec<Record>, RemoteError> {
        log::debug!("fetch dataset {}", kind.as_str());
        self.client.fetch_dataset(kind).inspect_err(|error| {
            log::warn!("fetch dataset {} failed: {error}", kind.as_str());
        })
    }

    fn load_lookup(&mut self, kind: LookupKind) -> Result<Vec<Record>, RemoteError> {
        self.client.fetch_lookup(kind)
    }

    fn write(&mut self, writes: &[WriteRequest]) -> Result<usize, WriteFailure> {
        send_batch(&self.client, writes)
    }

    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("fetch-{}", request.seq))
            .spawn(move || {
                log::debug!("fetch #{} {}", request.seq, request.kind.as_str());
                let result = client.fetch_dataset(request.kind).map_err(|error| {
                    log::warn!("fetch dataset {} failed: {error}", request.kind.as_str());
                    error.to_string()
                });
                if tx.send(InternalEvent::Fetched { request, result }).is_err() {
                    log::debug!("fetch #{} finished after the loop exited", request.seq);
                }
            })
            .context("spawn fetch thread")?;
        Ok(())
    }

    fn spawn_writes(&mut self, batch: WriteBatch, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("write-{}", batch.seq))
            .spawn(move || {
                let result = send_batch(&client, &batch.writes);
                if tx
                    .send(InternalEvent::Written {
                        seq: batch.seq,
                        result,
                    })
                    .is_err()
                {
                    log::debug!("write batch #{} finished after the loop exited", batch.seq);
                }
            })
            .context("spawn write thread")?;
        Ok(())
    }

    fn spawn_lookup(&mut self, request: LookupRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("lookup-{}", request.ticket))
            .spawn(move || {
                log::debug!("lookup {} {}", request.ticket, request.kind.describe());
                let result = client
                    .fetch_lookup(request.kind)
                    .map_err(|error| error.to_string());
                if tx
                    .send(InternalEvent::Lookup {
                        ticket: request.ticket,
                        result,
                    })
                    .is_err()
                {
                    log::debug!("lookup {} finished after the loop exited", request.ticket);
                }
            })
            .context("spawn lookup thread")?;
        Ok(())
    }
}

fn send_batch(client: &Client, writes: &[WriteRequest]) -> Result<usize, WriteFailure> {
    log::info!("send {} write(s)", writes.len());
    client.send_all(writes).inspect_err(|failure| {
        log::warn!("write rejected after {} applied: {failure}", failure.applied);
    })
}
