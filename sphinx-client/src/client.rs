//! High-level searchd client.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use sphinx_protocol::{
    Command, Decoder, Encoder, ExcerptOptions, KeywordInfo, QueryOutcome, QuerySpec, ReplyBody,
    ResultSet, StatusRow, UpdateValues,
};

/// A searchd session.
///
/// Without [`Client::open`] every call connects, handshakes, and disconnects.
/// After `open` all calls share one persistent connection until [`Client::close`].
/// `last_error` and `last_warning` always describe the most recent call.
pub struct Client {
    config: Option<ClientConfig>,
    connection: Option<Connection>,
    batch: Vec<Bytes>,
    last_error: String,
    last_warning: String,
    connect_error: bool,
}

impl Client {
    /// Creates an unconfigured client; every call fails until a server is set.
    pub fn new() -> Self {
        Self {
            config: None,
            connection: None,
            batch: Vec::new(),
            last_error: String::new(),
            last_warning: String::new(),
            connect_error: false,
        }
    }

    /// Creates a client from a validated configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self, ClientError> {
        config
            .address()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        let mut client = Self::new();
        client.config = Some(config);
        Ok(client)
    }

    /// Sets the server to talk to. No network I/O happens here.
    ///
    /// A `timeout_ms` of 0 keeps the configured timeouts. Changing the server
    /// drops a persistent connection to the previous one.
    pub fn configure_server(
        &mut self,
        host: &str,
        port: u16,
        timeout_ms: u64,
    ) -> Result<(), ClientError> {
        self.begin();

        let mut config = self.config.clone().unwrap_or_default();
        config.host = host.to_string();
        config.port = port;
        if timeout_ms > 0 {
            config.connect_timeout_ms = timeout_ms;
            config.read_timeout_ms = timeout_ms;
        }

        let result = config
            .address()
            .map(|_| ())
            .map_err(|e| ClientError::Configuration(e.to_string()));
        if result.is_ok() {
            if self.connection.take().is_some() {
                tracing::debug!("Server changed, dropping persistent connection");
            }
            self.config = Some(config);
        }
        self.finish(result)
    }

    pub fn config(&self) -> Option<&ClientConfig> {
        self.config.as_ref()
    }

    /// Returns whether a persistent connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Opens a persistent connection.
    pub async fn open(&mut self) -> Result<(), ClientError> {
        self.begin();
        let result = self.open_inner().await;
        self.finish(result)
    }

    async fn open_inner(&mut self) -> Result<(), ClientError> {
        let config = self.config.as_ref().ok_or_else(unconfigured)?;
        if self.connection.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let mut connection = Connection::connect(config).await?;
        connection.persist().await?;
        tracing::debug!(
            "Persistent session open to {} (protocol v{}, persistent={})",
            connection.address(),
            connection.server_version(),
            connection.is_persistent()
        );
        self.connection = Some(connection);
        Ok(())
    }

    /// Closes the persistent connection; a no-op when none is open.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.begin();
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        Ok(())
    }

    /// Runs a single search.
    ///
    /// A query searchd rejects is reported as [`ClientError::Server`].
    pub async fn query(
        &mut self,
        query: &str,
        index: &str,
        spec: &QuerySpec,
    ) -> Result<ResultSet, ClientError> {
        self.begin();
        let result = self.query_inner(query, index, spec).await;
        self.finish(result)
    }

    async fn query_inner(
        &mut self,
        query: &str,
        index: &str,
        spec: &QuerySpec,
    ) -> Result<ResultSet, ClientError> {
        self.require_config()?;
        spec.validate()?;

        let entry = spec.encode(query, index, "");
        let mut outcomes = self.search(&[entry]).await?;
        match outcomes.pop() {
            Some(Ok(result)) => Ok(result),
            Some(Err(failure)) => Err(ClientError::Server {
                status: failure.status,
                message: failure.message,
            }),
            None => Err(sphinx_protocol::ProtocolError::CountMismatch {
                field: "search results",
                expected: 1,
                actual: 0,
            }
            .into()),
        }
    }

    /// Queues a query for [`Client::run_queries`] and returns its position in the batch.
    pub fn add_query(
        &mut self,
        query: &str,
        index: &str,
        spec: &QuerySpec,
        comment: &str,
    ) -> Result<usize, ClientError> {
        self.begin();
        let result = spec
            .validate()
            .map(|()| {
                self.batch.push(spec.encode(query, index, comment));
                self.batch.len() - 1
            })
            .map_err(ClientError::from);
        self.finish(result)
    }

    /// Number of queries waiting for [`Client::run_queries`].
    pub fn pending_queries(&self) -> usize {
        self.batch.len()
    }

    /// Sends every queued query in one request.
    ///
    /// Returns one outcome per query, in the order they were added. The queue
    /// is emptied whether or not the request succeeds.
    pub async fn run_queries(&mut self) -> Result<Vec<QueryOutcome>, ClientError> {
        self.begin();
        let batch = std::mem::take(&mut self.batch);
        let result = self.run_queries_inner(batch).await;
        self.finish(result)
    }

    async fn run_queries_inner(
        &mut self,
        batch: Vec<Bytes>,
    ) -> Result<Vec<QueryOutcome>, ClientError> {
        self.require_config()?;
        if batch.is_empty() {
            return Err(ClientError::InvalidArgument("no queries added".into()));
        }
        self.search(&batch).await
    }

    async fn search(&mut self, entries: &[Bytes]) -> Result<Vec<QueryOutcome>, ClientError> {
        let frame = Encoder::search(entries)?;
        let payload = self.execute(Command::Search, &frame).await?;
        let outcomes = Decoder::search(&payload, entries.len())?;
        for warning in outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().ok()?.warning.as_deref())
        {
            self.add_warning(warning);
        }
        Ok(outcomes)
    }

    /// Builds highlighted snippets, one per document, in input order.
    pub async fn build_excerpts<S: AsRef<str>>(
        &mut self,
        docs: &[S],
        index: &str,
        words: &str,
        options: &ExcerptOptions,
    ) -> Result<Vec<String>, ClientError> {
        self.begin();
        let result = self.build_excerpts_inner(docs, index, words, options).await;
        self.finish(result)
    }

    async fn build_excerpts_inner<S: AsRef<str>>(
        &mut self,
        docs: &[S],
        index: &str,
        words: &str,
        options: &ExcerptOptions,
    ) -> Result<Vec<String>, ClientError> {
        self.require_config()?;
        if docs.is_empty() {
            return Err(ClientError::InvalidArgument("no documents given".into()));
        }
        if index.is_empty() {
            return Err(ClientError::InvalidArgument("index must not be empty".into()));
        }
        if words.is_empty() {
            return Err(ClientError::InvalidArgument("words must not be empty".into()));
        }

        let frame = Encoder::excerpts(docs, index, words, options)?;
        let payload = self.execute(Command::Excerpt, &frame).await?;
        Ok(Decoder::excerpts(&payload, docs.len())?)
    }

    /// Overwrites attribute values in place and returns the number of documents updated.
    ///
    /// An empty `values` mapping returns 0 without contacting the server.
    pub async fn update_attributes<S: AsRef<str>>(
        &mut self,
        index: &str,
        attrs: &[S],
        values: &UpdateValues,
    ) -> Result<u32, ClientError> {
        self.begin();
        let result = self.update_attributes_inner(index, attrs, values).await;
        self.finish(result)
    }

    async fn update_attributes_inner<S: AsRef<str>>(
        &mut self,
        index: &str,
        attrs: &[S],
        values: &UpdateValues,
    ) -> Result<u32, ClientError> {
        self.require_config()?;
        if values.is_empty() {
            return Ok(0);
        }
        if index.is_empty() {
            return Err(ClientError::InvalidArgument("index must not be empty".into()));
        }

        let frame = Encoder::update(index, attrs, values)?;
        let payload = self.execute(Command::Update, &frame).await?;
        let updated = Decoder::update(&payload)?;

        let requested = values.len() as u32;
        if updated < requested {
            return Err(ClientError::PartialUpdate { requested, updated });
        }
        Ok(updated)
    }

    /// Splits `query` into keywords as `index` would tokenize it.
    pub async fn build_keywords(
        &mut self,
        query: &str,
        index: &str,
        hits: bool,
    ) -> Result<Vec<KeywordInfo>, ClientError> {
        self.begin();
        let result = self.build_keywords_inner(query, index, hits).await;
        self.finish(result)
    }

    async fn build_keywords_inner(
        &mut self,
        query: &str,
        index: &str,
        hits: bool,
    ) -> Result<Vec<KeywordInfo>, ClientError> {
        self.require_config()?;
        if index.is_empty() {
            return Err(ClientError::InvalidArgument("index must not be empty".into()));
        }

        let frame = Encoder::keywords(query, index, hits)?;
        let payload = self.execute(Command::Keywords, &frame).await?;
        Ok(Decoder::keywords(&payload, hits)?)
    }

    /// Fetches the server status table.
    pub async fn status(&mut self) -> Result<Vec<StatusRow>, ClientError> {
        self.begin();
        let result = self.status_inner().await;
        self.finish(result)
    }

    async fn status_inner(&mut self) -> Result<Vec<StatusRow>, ClientError> {
        self.require_config()?;
        let frame = Encoder::status()?;
        let payload = self.execute(Command::Status, &frame).await?;
        Ok(Decoder::status(&payload)?)
    }

    /// Error text of the last call, empty if it succeeded.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Warning text of the last call, empty if there was none.
    pub fn last_warning(&self) -> &str {
        &self.last_warning
    }

    /// Returns whether the last call failed while connecting.
    pub fn is_connect_error(&self) -> bool {
        self.connect_error
    }

    /// Sends `frame` and returns the reply payload, recording any warning.
    async fn execute(&mut self, command: Command, frame: &BytesMut) -> Result<Bytes, ClientError> {
        let config = self.config.as_ref().ok_or_else(unconfigured)?;

        let reply = match self.connection.as_mut() {
            Some(connection) => match connection.request(frame).await {
                Ok(reply) => reply,
                Err(e) => {
                    if e.poisons_connection() {
                        tracing::warn!("Dropping persistent connection: {}", e);
                        self.connection = None;
                    }
                    return Err(e);
                }
            },
            None => {
                let mut connection = Connection::connect(config).await?;
                let reply = connection.request(frame).await;
                connection.close().await;
                reply?
            }
        };

        match reply.into_body(command)? {
            ReplyBody::Success { payload, warning } => {
                if let Some(warning) = warning {
                    tracing::warn!("searchd warning: {}", warning);
                    self.add_warning(&warning);
                }
                Ok(payload)
            }
            ReplyBody::Failure(failure) => Err(ClientError::Server {
                status: failure.status,
                message: failure.message,
            }),
        }
    }

    fn require_config(&self) -> Result<&ClientConfig, ClientError> {
        self.config.as_ref().ok_or_else(unconfigured)
    }

    fn add_warning(&mut self, warning: &str) {
        if !self.last_warning.is_empty() {
            self.last_warning.push_str("; ");
        }
        self.last_warning.push_str(warning);
    }

    fn begin(&mut self) {
        self.last_error.clear();
        self.last_warning.clear();
        self.connect_error = false;
    }

    fn finish<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            tracing::debug!("Call failed: {}", e);
            self.last_error = e.to_string();
            self.connect_error = e.is_connect_error();
        }
        result
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

fn unconfigured() -> ClientError {
    ClientError::Configuration("server not configured, call configure_server first".into())
}
