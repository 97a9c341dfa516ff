//! End-to-end tests against an in-process fake searchd.

use bytes::Bytes;
use sphinx_client::{Client, ClientError};
use sphinx_protocol::{
    AttrSchema, AttrType, AttrValue, Command, Decoder, Encoder, ExcerptOptions, ExcerptsRequest,
    Filter, KeywordInfo, Match, QueryOutcome, QuerySpec, Reply, RequestFrame, ResultSet,
    SearchFailure, SearchQuery, SearchdStatus, StatusRow, UpdateValues, WordStat,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

/// How the fake answers the next request.
#[derive(Debug, Clone)]
enum Behavior {
    Normal,
    /// Valid frame, payload cut short.
    Truncate,
    /// Reads the request and never answers.
    Silent,
    Fail(SearchdStatus, &'static str),
    Warn(&'static str),
    OldVersion,
    /// Valid reply written in chunks of this many bytes, each after a pause.
    Trickle(usize, Duration),
}

#[derive(Debug, Clone)]
struct Doc {
    title: &'static str,
    group_id: u32,
    tags: Vec<u32>,
}

struct FakeState {
    docs: BTreeMap<u64, Doc>,
    script: VecDeque<Behavior>,
    connections: usize,
}

impl FakeState {
    fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            docs: sample_docs(),
            script: VecDeque::new(),
            connections: 0,
        }))
    }
}

struct FakeSearchd {
    port: u16,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSearchd {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = FakeState::shared();

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                shared.lock().unwrap().connections += 1;
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self { port, state }
    }

    fn client(&self) -> Client {
        let mut client = Client::new();
        client.configure_server("127.0.0.1", self.port, 500).unwrap();
        client
    }

    fn script(&self, behavior: Behavior) {
        self.state.lock().unwrap().script.push_back(behavior);
    }

    fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }
}

fn sample_docs() -> BTreeMap<u64, Doc> {
    let mut docs = BTreeMap::new();
    docs.insert(
        1,
        Doc {
            title: "test one",
            group_id: 1,
            tags: vec![1, 2],
        },
    );
    docs.insert(
        2,
        Doc {
            title: "test two",
            group_id: 2,
            tags: vec![3],
        },
    );
    docs.insert(
        3,
        Doc {
            title: "another doc",
            group_id: 2,
            tags: vec![],
        },
    );
    docs.insert(
        4,
        Doc {
            title: "doc number four test test",
            group_id: 1,
            tags: vec![5, 6, 7],
        },
    );
    docs
}

async fn serve<S>(mut socket: S, state: Arc<Mutex<FakeState>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if socket.write_all(&1u32.to_be_bytes()).await.is_err() {
        return;
    }
    let mut hello = [0u8; 4];
    if socket.read_exact(&mut hello).await.is_err() {
        return;
    }

    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; 4096];
    let mut persistent = false;
    loop {
        let frame = loop {
            match decoder.decode_request() {
                Ok(Some(frame)) => break frame,
                Ok(None) => {}
                Err(_) => return,
            }
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => decoder.extend(&buf[..n]),
            }
        };

        if frame.command == Command::Persist {
            persistent = true;
            continue;
        }

        let behavior = state
            .lock()
            .unwrap()
            .script
            .pop_front()
            .unwrap_or(Behavior::Normal);

        let reply = match behavior {
            Behavior::Silent => {
                while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                return;
            }
            Behavior::Fail(status, message) => Reply::failure(frame.command, status, message),
            Behavior::Truncate => {
                let payload = handle(&state, &frame);
                Reply::ok(frame.command, payload.slice(..payload.len() - 3))
            }
            Behavior::Warn(warning) => {
                Reply::warning(frame.command, warning, &handle(&state, &frame))
            }
            Behavior::OldVersion => {
                let mut reply = Reply::ok(frame.command, handle(&state, &frame));
                reply.version = frame.command.version() - 1;
                reply
            }
            Behavior::Trickle(chunk, gap) => {
                let encoded = Reply::ok(frame.command, handle(&state, &frame)).encode();
                for part in encoded.chunks(chunk) {
                    tokio::time::sleep(gap).await;
                    if socket.write_all(part).await.is_err() {
                        return;
                    }
                }
                if !persistent {
                    return;
                }
                continue;
            }
            Behavior::Normal => Reply::ok(frame.command, handle(&state, &frame)),
        };

        if socket.write_all(&reply.encode()).await.is_err() || !persistent {
            return;
        }
    }
}

fn handle(state: &Mutex<FakeState>, frame: &RequestFrame) -> Bytes {
    let mut state = state.lock().unwrap();
    match frame.command {
        Command::Search => {
            let queries = Decoder::search_request(&frame.body).unwrap();
            let outcomes: Vec<QueryOutcome> =
                queries.iter().map(|q| search(&state.docs, q)).collect();
            Encoder::search_reply(&outcomes)
        }
        Command::Excerpt => {
            let request = Decoder::excerpts_request(&frame.body).unwrap();
            let excerpts: Vec<String> = request
                .docs
                .iter()
                .map(|doc| highlight(doc, &request))
                .collect();
            Encoder::excerpts_reply(&excerpts)
        }
        Command::Update => {
            let request = Decoder::update_request(&frame.body).unwrap();
            let mut updated = 0;
            match &request.values {
                UpdateValues::Scalar(rows) => {
                    for (id, values) in rows {
                        if let Some(doc) = state.docs.get_mut(id) {
                            for (attr, value) in request.attrs.iter().zip(values) {
                                if attr == "group_id" {
                                    doc.group_id = *value;
                                }
                            }
                            updated += 1;
                        }
                    }
                }
                UpdateValues::Multi(rows) => {
                    for (id, lists) in rows {
                        if let Some(doc) = state.docs.get_mut(id) {
                            for (attr, list) in request.attrs.iter().zip(lists) {
                                if attr == "tags" {
                                    doc.tags = list.clone();
                                }
                            }
                            updated += 1;
                        }
                    }
                }
            }
            Encoder::update_reply(updated)
        }
        Command::Keywords => {
            let request = Decoder::keywords_request(&frame.body).unwrap();
            let keywords: Vec<KeywordInfo> = request
                .query
                .split_whitespace()
                .map(|word| {
                    let normalized = word.to_lowercase();
                    let (docs, hits) = word_stats(&state.docs, &normalized);
                    KeywordInfo {
                        tokenized: word.to_string(),
                        normalized,
                        docs: request.hits.then_some(docs),
                        hits: request.hits.then_some(hits),
                    }
                })
                .collect();
            Encoder::keywords_reply(&keywords, request.hits)
        }
        Command::Status => Encoder::status_reply(&[
            StatusRow {
                label: "uptime".into(),
                value: "1".into(),
            },
            StatusRow {
                label: "connections".into(),
                value: state.connections.to_string(),
            },
        ]),
        Command::Persist => Bytes::new(),
    }
}

fn word_stats(docs: &BTreeMap<u64, Doc>, word: &str) -> (u32, u32) {
    let mut found = 0;
    let mut hits = 0;
    for doc in docs.values() {
        let n = doc.title.split_whitespace().filter(|w| *w == word).count() as u32;
        if n > 0 {
            found += 1;
            hits += n;
        }
    }
    (found, hits)
}

fn passes(doc: &Doc, filter: &Filter) -> bool {
    let value = match filter.attr() {
        "group_id" => doc.group_id as i64,
        _ => return true,
    };
    match filter {
        Filter::Values {
            values, exclude, ..
        } => values.contains(&value) != *exclude,
        Filter::Range {
            min, max, exclude, ..
        } => (*min..=*max).contains(&value) != *exclude,
        Filter::FloatRange { .. } => true,
    }
}

fn search(docs: &BTreeMap<u64, Doc>, query: &SearchQuery) -> QueryOutcome {
    if query.index != "*" && query.index != "test1" {
        return Err(SearchFailure {
            status: SearchdStatus::Error,
            message: format!("unknown local index '{}' in search request", query.index),
        });
    }

    let words: Vec<String> = query
        .query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    let mut found = Vec::new();
    for (id, doc) in docs {
        let title: Vec<&str> = doc.title.split_whitespace().collect();
        let all_words = words.iter().all(|w| title.contains(&w.as_str()));
        if !all_words || !query.spec.filters.iter().all(|f| passes(doc, f)) {
            continue;
        }

        let hits = title.iter().filter(|t| words.iter().any(|w| w == *t)).count() as u32;
        let mut attrs = BTreeMap::new();
        attrs.insert("group_id".to_string(), AttrValue::Integer(doc.group_id));
        attrs.insert("tags".to_string(), AttrValue::Multi(doc.tags.clone()));
        found.push(Match {
            id: *id,
            weight: 1000 + hits,
            attrs,
        });
    }

    let total_found = found.len() as u32;
    let matches: Vec<Match> = found
        .into_iter()
        .skip(query.spec.offset as usize)
        .take(query.spec.limit as usize)
        .collect();

    // Pretend every time-limited query ran out of time
    let warning = (query.spec.max_query_time > 0)
        .then(|| format!("query time exceeded max_query_time={}", query.spec.max_query_time));

    Ok(ResultSet {
        warning,
        fields: vec!["title".into()],
        attrs: vec![
            AttrSchema {
                name: "group_id".into(),
                attr_type: AttrType::Integer,
            },
            AttrSchema {
                name: "tags".into(),
                attr_type: AttrType::MultiInteger,
            },
        ],
        total: matches.len() as u32,
        matches,
        total_found,
        total_retrievable: total_found.min(query.spec.max_matches),
        elapsed: Duration::from_millis(1),
        words: words
            .iter()
            .map(|w| {
                let (docs, hits) = word_stats(docs, w);
                WordStat {
                    word: w.clone(),
                    docs,
                    hits,
                }
            })
            .collect(),
    })
}

fn highlight(doc: &str, request: &ExcerptsRequest) -> String {
    let words: Vec<&str> = request.words.split_whitespace().collect();
    doc.split_whitespace()
        .map(|token| {
            if words.contains(&token) {
                format!(
                    "{}{}{}",
                    request.options.before_match, token, request.options.after_match
                )
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::test]
async fn query_returns_matches() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let result = client
        .query("test", "test1", &QuerySpec::default())
        .await
        .unwrap();
    assert!(result.total >= 1);
    assert_eq!(result.matches.len() as u32, result.total);
    assert!(result.total_found >= result.total);
    assert!(result.matches.iter().all(|m| m.weight > 0));
    assert_eq!(result.attr_type("tags"), Some(AttrType::MultiInteger));
    assert_eq!(result.words[0].word, "test");
    assert_eq!(result.words[0].docs, 3);
    assert_eq!(result.words[0].hits, 4);
    assert!(client.last_error().is_empty());
    assert!(client.last_warning().is_empty());
}

#[tokio::test]
async fn query_window_and_filters() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let mut spec = QuerySpec::new();
    spec.set_limits(1, 1, 1000, 0).unwrap();
    let result = client.query("test", "test1", &spec).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.total_found, 3);
    assert_eq!(result.matches[0].id, 2);

    let mut spec = QuerySpec::new();
    spec.add_filter("group_id", vec![1], true).unwrap();
    let result = client.query("test", "test1", &spec).await.unwrap();
    let ids: Vec<u64> = result.matches.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2]);
}

#[tokio::test]
async fn update_then_query_reflects_new_value() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let mut rows = BTreeMap::new();
    rows.insert(2, vec![22]);
    let updated = client
        .update_attributes("test1", &["group_id"], &UpdateValues::Scalar(rows))
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let mut spec = QuerySpec::new();
    spec.add_filter("group_id", vec![22], false).unwrap();
    let result = client.query("test", "test1", &spec).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.matches[0].id, 2);
    assert_eq!(
        result.matches[0].attr("group_id"),
        Some(&AttrValue::Integer(22))
    );
}

#[tokio::test]
async fn update_multi_valued_attribute() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let mut rows = BTreeMap::new();
    rows.insert(1, vec![vec![123, 456, 789]]);
    client
        .update_attributes("test1", &["tags"], &UpdateValues::Multi(rows))
        .await
        .unwrap();

    let result = client
        .query("one", "test1", &QuerySpec::default())
        .await
        .unwrap();
    assert_eq!(
        result.matches[0].attr("tags").and_then(|v| v.as_multi()),
        Some(&[123u32, 456, 789][..])
    );
}

#[tokio::test]
async fn partial_update_is_reported() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let mut rows = BTreeMap::new();
    rows.insert(2, vec![33]);
    rows.insert(999, vec![33]);
    let err = client
        .update_attributes("test1", &["group_id"], &UpdateValues::Scalar(rows))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::PartialUpdate {
            requested: 2,
            updated: 1
        }
    ));
    assert!(client.last_error().contains("1 of 2"));
}

#[tokio::test]
async fn empty_update_returns_zero() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let updated = client
        .update_attributes("test1", &["group_id"], &UpdateValues::Scalar(BTreeMap::new()))
        .await
        .unwrap();
    assert_eq!(updated, 0);
    assert_eq!(searchd.connections(), 0);
}

#[tokio::test]
async fn excerpts_keep_count_and_order() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let docs = [
        "this is my test text to be highlighted",
        "another test text to be highlighted, below limit",
        "test number three, without phrase match",
        "final test, not only without phrase match",
    ];
    let options = ExcerptOptions::default()
        .with_limit(60)
        .with_around(3)
        .with_markers("[", "]");
    let excerpts = client
        .build_excerpts(&docs, "test1", "test text", &options)
        .await
        .unwrap();

    assert_eq!(excerpts.len(), docs.len());
    assert_eq!(excerpts[0], "this is my [test] [text] to be highlighted");
    assert!(excerpts[2].starts_with("[test] number three"));
    assert!(excerpts[3].starts_with("final"));
}

#[tokio::test]
async fn keywords_with_and_without_hits() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let keywords = client
        .build_keywords("Test Doc", "test1", true)
        .await
        .unwrap();
    assert_eq!(keywords.len(), 2);
    assert_eq!(keywords[0].tokenized, "Test");
    assert_eq!(keywords[0].normalized, "test");
    assert_eq!(keywords[0].docs, Some(3));
    assert_eq!(keywords[1].docs, Some(2));

    let keywords = client
        .build_keywords("Test", "test1", false)
        .await
        .unwrap();
    assert_eq!(keywords[0].hits, None);
}

#[tokio::test]
async fn status_table() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let rows = client.status().await.unwrap();
    assert_eq!(rows[0].label, "uptime");
    assert_eq!(rows[1].label, "connections");
}

#[tokio::test]
async fn batch_reports_each_query() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    client
        .add_query("test", "test1", &QuerySpec::default(), "")
        .unwrap();
    client
        .add_query("test", "missing", &QuerySpec::default(), "")
        .unwrap();
    client
        .add_query("doc", "*", &QuerySpec::default(), "")
        .unwrap();

    let outcomes = client.run_queries().await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].as_ref().unwrap().total, 3);
    let failure = outcomes[1].as_ref().unwrap_err();
    assert_eq!(failure.status, SearchdStatus::Error);
    assert!(failure.message.contains("missing"));
    assert_eq!(outcomes[2].as_ref().unwrap().total, 2);
    assert_eq!(client.pending_queries(), 0);
    assert!(client.last_warning().is_empty());
}

#[tokio::test]
async fn batch_collects_per_query_warnings() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let mut limited = QuerySpec::default();
    limited.set_max_query_time(5);
    let mut tighter = QuerySpec::default();
    tighter.set_max_query_time(1);

    client.add_query("test", "test1", &limited, "").unwrap();
    client.add_query("test", "missing", &limited, "").unwrap();
    client.add_query("doc", "*", &QuerySpec::default(), "").unwrap();
    client.add_query("doc", "*", &tighter, "").unwrap();

    let outcomes = client.run_queries().await.unwrap();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].as_ref().unwrap().warning.is_some());
    assert!(outcomes[2].as_ref().unwrap().warning.is_none());
    assert_eq!(
        client.last_warning(),
        "query time exceeded max_query_time=5; query time exceeded max_query_time=1"
    );

    // Single queries report the same warning
    client.query("test", "test1", &limited).await.unwrap();
    assert_eq!(
        client.last_warning(),
        "query time exceeded max_query_time=5"
    );
}

#[tokio::test]
async fn rejected_query_is_a_server_error() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    let err = client
        .query("test", "missing", &QuerySpec::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Server {
            status: SearchdStatus::Error,
            ..
        }
    ));
    assert!(client.last_error().contains("unknown local index"));
}

#[tokio::test]
async fn error_and_retry_replies() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    searchd.script(Behavior::Fail(SearchdStatus::Error, "index test1: not ready"));
    let err = client.status().await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(client.last_error(), "searchd error: index test1: not ready");

    searchd.script(Behavior::Fail(SearchdStatus::Retry, "maxed out"));
    let err = client.status().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(client.last_error(), "temporary searchd error: maxed out");

    // The next call starts clean
    client.status().await.unwrap();
    assert!(client.last_error().is_empty());
}

#[tokio::test]
async fn warnings_are_recorded() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    searchd.script(Behavior::Warn("index test1 is stale"));
    let rows = client.status().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(client.last_warning(), "index test1 is stale");

    searchd.script(Behavior::OldVersion);
    client
        .query("test", "test1", &QuerySpec::default())
        .await
        .unwrap();
    assert!(client.last_warning().contains("older than client's"));

    client.status().await.unwrap();
    assert!(client.last_warning().is_empty());
}

#[tokio::test]
async fn malformed_reply_leaves_session_usable() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    searchd.script(Behavior::Truncate);
    let err = client
        .query("test", "test1", &QuerySpec::default())
        .await
        .unwrap_err();
    assert!(err.is_malformed());
    assert!(!client.last_error().is_empty());

    let result = client
        .query("test", "test1", &QuerySpec::default())
        .await
        .unwrap();
    assert_eq!(result.total, 3);
    assert!(client.last_error().is_empty());
}

#[tokio::test]
async fn malformed_reply_keeps_persistent_connection() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();
    client.open().await.unwrap();

    searchd.script(Behavior::Truncate);
    assert_err!(client.query("test", "test1", &QuerySpec::default()).await);
    assert!(client.is_connected());

    let result = assert_ok!(client.query("test", "test1", &QuerySpec::default()).await);
    assert_eq!(result.total, 3);
    assert_eq!(searchd.connections(), 1);
    assert_ok!(client.close().await);
}

#[tokio::test]
async fn persistent_connection_is_reused() {
    let searchd = FakeSearchd::start().await;
    let mut client = searchd.client();

    client.open().await.unwrap();
    assert!(client.is_connected());
    assert!(matches!(
        client.open().await,
        Err(ClientError::AlreadyConnected)
    ));
    assert_eq!(client.last_error(), "already connected");

    for _ in 0..3 {
        client
            .query("test", "test1", &QuerySpec::default())
            .await
            .unwrap();
    }
    client.status().await.unwrap();
    assert_eq!(searchd.connections(), 1);

    client.close().await.unwrap();
    assert!(!client.is_connected());

    // Back to one connection per call
    client.status().await.unwrap();
    client.status().await.unwrap();
    assert_eq!(searchd.connections(), 3);
}

#[tokio::test]
async fn timeout_is_reported() {
    let searchd = FakeSearchd::start().await;
    let mut client = Client::new();
    client
        .configure_server("127.0.0.1", searchd.port, 100)
        .unwrap();

    searchd.script(Behavior::Silent);
    let err = client.status().await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(client.last_error(), "request timeout");
    assert!(!client.is_connect_error());

    client.status().await.unwrap();
}

#[tokio::test]
async fn timeout_drops_persistent_connection() {
    let searchd = FakeSearchd::start().await;
    let mut client = Client::new();
    client
        .configure_server("127.0.0.1", searchd.port, 100)
        .unwrap();
    client.open().await.unwrap();

    searchd.script(Behavior::Silent);
    assert_err!(client.status().await);
    assert!(!client.is_connected());

    assert_ok!(client.status().await);
}

#[tokio::test]
async fn slow_reply_resets_read_timeout() {
    let searchd = FakeSearchd::start().await;
    let mut client = Client::new();
    client
        .configure_server("127.0.0.1", searchd.port, 150)
        .unwrap();

    // Every gap is under the timeout, the whole reply takes several times longer
    searchd.script(Behavior::Trickle(8, Duration::from_millis(60)));
    let rows = assert_ok!(client.status().await);
    assert_eq!(rows.len(), 2);
    assert!(client.last_error().is_empty());
}

#[tokio::test]
async fn slow_reply_keeps_persistent_connection() {
    let searchd = FakeSearchd::start().await;
    let mut client = Client::new();
    client
        .configure_server("127.0.0.1", searchd.port, 150)
        .unwrap();
    client.open().await.unwrap();

    searchd.script(Behavior::Trickle(8, Duration::from_millis(60)));
    assert_ok!(client.status().await);
    assert!(client.is_connected());

    assert_ok!(client.status().await);
    assert_eq!(searchd.connections(), 1);
    assert_ok!(client.close().await);
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("searchd.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();

    let state = FakeState::shared();
    let shared = state.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            shared.lock().unwrap().connections += 1;
            tokio::spawn(serve(socket, shared.clone()));
        }
    });

    // Bare path, one connection per call; the port is ignored
    let mut client = Client::new();
    client
        .configure_server(path.to_str().unwrap(), 0, 500)
        .unwrap();
    let result = client
        .query("test", "test1", &QuerySpec::default())
        .await
        .unwrap();
    assert_eq!(result.total, 3);

    // unix:// form over a persistent connection
    let host = format!("unix://{}", path.display());
    client.configure_server(&host, 0, 500).unwrap();
    client.open().await.unwrap();
    assert_eq!(client.status().await.unwrap().len(), 2);
    assert_ok!(client.build_keywords("test", "test1", false).await);
    assert_ok!(client.close().await);

    assert_eq!(state.lock().unwrap().connections, 2);
}
