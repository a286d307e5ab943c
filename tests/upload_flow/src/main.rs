fn main() {
    println!("Run `cargo test -p upload-flow` to execute end-to-end upload flow tests.");
}

#[cfg(test)]
mod tests {
    use clipcast_engine::{EngineConfig, UploadEngine};
    use clipcast_protocol::{WorkerRequest, WorkerResponse};
    use clipcast_worker::{UploadWorker, WorkerConfig};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    /// Deterministic, non-repeating-ish byte pattern so ordering mistakes
    /// show up as content mismatches, not just length mismatches.
    fn patterned(len: usize, seed: usize) -> Vec<u8> {
        (0..len).map(|i| ((seed + i) % 251) as u8).collect()
    }

    fn content_range(request: &Request) -> &str {
        request
            .headers
            .get("Content-Range")
            .unwrap()
            .to_str()
            .unwrap()
    }

    async fn accept_all(server: &MockServer) {
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"videoId": "v-1"})),
            )
            .mount(server)
            .await;
    }

    /// A realistic recording: three capture fragments of 300000, 300000
    /// and 500000 bytes at 256 KiB alignment must reach the destination as
    /// two aligned chunks of 262144 bytes and one final chunk of 575712
    /// bytes, in order, with every byte accounted for.
    #[tokio::test]
    async fn fragment_stream_reaches_destination_aligned_and_complete() {
        let server = MockServer::start().await;
        accept_all(&server).await;

        let mut config = EngineConfig::new(server.uri(), "video/webm");
        config.chunk_alignment = 262_144;
        let mut engine = UploadEngine::new(config).unwrap();

        let fragments = [
            (patterned(300_000, 0), false),
            (patterned(300_000, 300_000), false),
            (patterned(500_000, 600_000), true),
        ];
        let mut ingested = Vec::new();
        for (fragment, is_last) in &fragments {
            engine.ingest(fragment, *is_last).unwrap();
            ingested.extend_from_slice(fragment);
        }
        let result = engine.finalize().await.unwrap();

        assert_eq!(result.total_bytes, 1_100_000);
        assert_eq!(result.response.unwrap()["videoId"], "v-1");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(content_range(&requests[0]), "bytes 0-262143/*");
        assert_eq!(content_range(&requests[1]), "bytes 262144-524287/*");
        assert_eq!(content_range(&requests[2]), "bytes 524288-1099999/1100000");
        assert_eq!(requests[0].body.len(), 262_144);
        assert_eq!(requests[1].body.len(), 262_144);
        assert_eq!(requests[2].body.len(), 575_712);

        // Byte conservation: the PUT bodies, concatenated, are exactly the
        // ingested stream.
        let replayed: Vec<u8> = requests.iter().flat_map(|r| r.body.clone()).collect();
        assert_eq!(replayed, ingested);
    }

    /// A mid-stream 308 moves the upload cursor to the server-confirmed
    /// offset; every subsequent chunk is labelled from there rather than
    /// from the naive running total.
    #[tokio::test]
    async fn resynced_cursor_shifts_subsequent_chunk_ranges() {
        let server = MockServer::start().await;
        // First PUT: the destination reports it only kept bytes 0-7.
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes 0-7"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        accept_all(&server).await;

        let mut config = EngineConfig::new(server.uri(), "video/webm");
        config.chunk_alignment = 16;
        let mut engine = UploadEngine::new(config).unwrap();

        engine.ingest(&patterned(16, 0), false).unwrap();
        engine.ingest(&patterned(16, 16), true).unwrap();
        let result = engine.finalize().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(content_range(&requests[0]), "bytes 0-15/*");
        // The final chunk starts at the resynced offset 8, not at 16, and
        // the known total reflects the confirmed cursor.
        assert_eq!(content_range(&requests[1]), "bytes 8-23/24");
        assert_eq!(result.total_bytes, 24);
    }

    /// The same flow driven entirely through serialized worker messages,
    /// crossing the JSON boundary both ways as a real embedding would.
    #[tokio::test]
    async fn worker_message_flow_end_to_end() {
        let server = MockServer::start().await;
        accept_all(&server).await;

        let mut worker = UploadWorker::spawn_with(WorkerConfig {
            chunk_alignment: 8,
            ..WorkerConfig::default()
        });
        let mut responses = worker.take_responses().unwrap();

        let wire_messages = [
            serde_json::json!({
                "type": "initialize",
                "instanceId": "rec-1",
                "destinationUrl": server.uri(),
                "contentType": "video/webm",
            }),
            serde_json::json!({
                "type": "bufferChunk",
                "instanceId": "rec-1",
                // "0123456789" base64-encoded.
                "chunk": "MDEyMzQ1Njc4OQ==",
                "isLast": false,
            }),
            serde_json::json!({
                "type": "bufferChunk",
                "instanceId": "rec-1",
                // "abcdef" base64-encoded.
                "chunk": "YWJjZGVm",
                "isLast": true,
            }),
        ];
        for message in wire_messages {
            let request: WorkerRequest = serde_json::from_value(message).unwrap();
            worker.submit(request).await.unwrap();
        }

        let first = serde_json::to_value(responses.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "uploadSuccess");
        assert_eq!(first["instanceId"], "rec-1");
        assert_eq!(first["isFinal"], false);

        let second = responses.recv().await.unwrap();
        assert_eq!(
            second,
            WorkerResponse::UploadSuccess {
                instance_id: "rec-1".into(),
                is_final: true,
                video_upload_response: Some(serde_json::json!({"videoId": "v-1"})),
            }
        );

        let requests = server.received_requests().await.unwrap();
        let replayed: Vec<u8> = requests.iter().flat_map(|r| r.body.clone()).collect();
        assert_eq!(replayed, b"0123456789abcdef");
    }
}
