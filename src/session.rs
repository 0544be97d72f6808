//! Query sessions layered on top of a [`QueryClient`]
//!
//! A session borrows the client for its whole lifetime; the client keeps
//! exclusive ownership of the connection.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{QueryError, SessionError};
use crate::query::{Command, QueryClient, QueryResult, Record, QUIT};
use crate::transfer::TransferChannel;

/// How a virtual server is addressed by `use`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSelector {
    Port(u16),
    Id(u32),
}

/// Notification groups for `servernotifyregister`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Server,
    Channel(u32),
    TextServer,
    TextChannel,
    TextPrivate,
    /// Every group above, with channel events for the given channel
    All(u32),
}

impl NotifyEvent {
    /// Parse a configuration token such as `server` or `channel:5`
    pub fn parse(token: &str) -> Option<Self> {
        let (name, id) = match token.split_once(':') {
            Some((name, id)) => (name, Some(id.parse().ok()?)),
            None => (token, None),
        };
        match name.trim().to_lowercase().as_str() {
            "server" => Some(NotifyEvent::Server),
            "channel" => Some(NotifyEvent::Channel(id.unwrap_or(0))),
            "textserver" => Some(NotifyEvent::TextServer),
            "textchannel" => Some(NotifyEvent::TextChannel),
            "textprivate" => Some(NotifyEvent::TextPrivate),
            "all" => Some(NotifyEvent::All(id.unwrap_or(0))),
            _ => None,
        }
    }

    fn commands(self) -> Vec<Command> {
        let register = |event: &str| Command::new("servernotifyregister").param("event", event);
        match self {
            NotifyEvent::Server => vec![register("server")],
            NotifyEvent::Channel(id) => vec![register("channel").param("id", id)],
            NotifyEvent::TextServer => vec![register("textserver")],
            NotifyEvent::TextChannel => vec![register("textchannel")],
            NotifyEvent::TextPrivate => vec![register("textprivate")],
            NotifyEvent::All(id) => [
                NotifyEvent::Server,
                NotifyEvent::Channel(id),
                NotifyEvent::TextServer,
                NotifyEvent::TextChannel,
                NotifyEvent::TextPrivate,
            ]
            .into_iter()
            .flat_map(NotifyEvent::commands)
            .collect(),
        }
    }
}

/// What a session should set up right after connecting
#[derive(Debug, Clone, Default)]
pub struct SessionTarget {
    pub credentials: Option<(String, String)>,
    pub server: Option<ServerSelector>,
    pub nickname: Option<String>,
    pub channel_id: Option<u32>,
}

/// Our own client as reported by `whoami`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub client_id: u32,
    pub channel_id: u32,
    pub nickname: String,
    pub database_id: u32,
}

impl Identity {
    fn from_record(record: &Record) -> Result<Self, SessionError> {
        let number = |field: &'static str| {
            record
                .get_str(field)
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or(SessionError::MissingField(field))
        };
        Ok(Identity {
            client_id: number("client_id")?,
            channel_id: number("client_channel_id")?,
            nickname: record
                .get_str("client_nickname")
                .ok_or(SessionError::MissingField("client_nickname"))?
                .to_string(),
            database_id: number("client_database_id")?,
        })
    }
}

/// A connected endpoint, chosen once at construction
pub enum Session<'a, S = TcpStream> {
    /// Instance-level query session
    Admin(AdminSession<'a, S>),
    /// Query session bound to one virtual server
    Server(ServerSession<'a, S>),
    /// File transfer connection
    Transfer(TransferChannel),
}

impl<'a, S> Session<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Log in and select a server as requested by `target`
    pub async fn open(
        client: &'a QueryClient<S>,
        target: &SessionTarget,
    ) -> Result<Self, SessionError> {
        let admin = AdminSession::new(client);

        if let Some((user, password)) = &target.credentials {
            admin.login(user, password).await?;
        }

        let Some(selector) = target.server else {
            return Ok(Session::Admin(admin));
        };

        let mut server = admin
            .select_server(selector, target.nickname.as_deref(), false)
            .await?;
        if let Some(cid) = target.channel_id {
            server.switch_channel(cid).await?;
        }
        Ok(Session::Server(server))
    }

    /// The query client behind this session, if it has one
    pub fn query_client(&self) -> Option<&'a QueryClient<S>> {
        match self {
            Session::Admin(admin) => Some(admin.client),
            Session::Server(server) => Some(server.client),
            Session::Transfer(_) => None,
        }
    }
}

impl Session<'_, TcpStream> {
    /// Open a file transfer connection
    pub async fn transfer(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, QueryError> {
        let channel = TransferChannel::connect(host, port, connect_timeout, read_timeout).await?;
        Ok(Session::Transfer(channel))
    }
}

/// Instance-level session
pub struct AdminSession<'a, S = TcpStream> {
    client: &'a QueryClient<S>,
}

impl<'a, S> AdminSession<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: &'a QueryClient<S>) -> Self {
        Self { client }
    }

    pub async fn login(&self, user: &str, password: &str) -> Result<(), SessionError> {
        let cmd = Command::new("login")
            .param("client_login_name", user)
            .param("client_login_password", password);
        let result = self.client.run(&cmd).await?;
        if !result.success {
            return Err(SessionError::LoginFailed(result.message));
        }
        info!("Logged in as {}", user);
        Ok(())
    }

    /// Select a virtual server, optionally under a nickname
    pub async fn select_server(
        &self,
        selector: ServerSelector,
        nickname: Option<&str>,
        virtual_start: bool,
    ) -> Result<ServerSession<'a, S>, SessionError> {
        let mut cmd = match selector {
            ServerSelector::Port(port) => Command::new("use").param("port", port),
            ServerSelector::Id(sid) => Command::new("use").param("sid", sid),
        };
        cmd = cmd.opt_param("client_nickname", nickname);
        if virtual_start {
            cmd = cmd.flag("virtual");
        }

        let result = self.client.run(&cmd).await?;
        if !result.success {
            return Err(SessionError::SelectFailed(result.message));
        }
        info!("Selected server {:?}", selector);
        ServerSession::new(self.client, selector).await
    }

    pub async fn version(&self) -> Result<QueryResult, QueryError> {
        self.client.run(&Command::new("version")).await
    }

    pub async fn whoami(&self) -> Result<QueryResult, QueryError> {
        self.client.run(&Command::new("whoami")).await
    }

    /// Send `quit` and close the connection
    pub async fn quit(self) -> Result<QueryResult, QueryError> {
        let result = self.client.execute(QUIT).await;
        self.client.close().await;
        result
    }
}

/// Session bound to one virtual server
pub struct ServerSession<'a, S = TcpStream> {
    client: &'a QueryClient<S>,
    selector: ServerSelector,
    identity: Identity,
}

impl<'a, S> ServerSession<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn new(
        client: &'a QueryClient<S>,
        selector: ServerSelector,
    ) -> Result<Self, SessionError> {
        let records = client.run(&Command::new("whoami")).await?.into_records()?;
        let record = records.first().ok_or(SessionError::MissingField("client_id"))?;
        let identity = Identity::from_record(record)?;
        debug!("Session identity: {:?}", identity);
        Ok(Self {
            client,
            selector,
            identity,
        })
    }

    pub fn selector(&self) -> ServerSelector {
        self.selector
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn client(&self) -> &'a QueryClient<S> {
        self.client
    }

    pub async fn whoami(&self) -> Result<QueryResult, QueryError> {
        self.client.run(&Command::new("whoami")).await
    }

    /// Register for notifications; stops at the first rejected registration
    pub async fn notify_register(&self, event: NotifyEvent) -> Result<(), QueryError> {
        for cmd in event.commands() {
            self.client.run(&cmd).await?.into_records()?;
        }
        debug!("Registered for {:?} notifications", event);
        Ok(())
    }

    pub async fn notify_unregister(&self) -> Result<(), QueryError> {
        self.client
            .run(&Command::new("servernotifyunregister"))
            .await?
            .into_records()?;
        Ok(())
    }

    /// Queued events; with `wait` and an empty queue, block for the next one
    pub async fn events(&self, wait: bool) -> Result<Vec<Record>, QueryError> {
        let queued = self.client.drain_events();
        if !queued.is_empty() || !wait {
            return Ok(queued);
        }
        Ok(vec![self.client.wait_event(None).await?])
    }

    /// Move our own client into another channel
    pub async fn switch_channel(&mut self, channel_id: u32) -> Result<(), QueryError> {
        let cmd = Command::new("clientmove")
            .param("clid", self.identity.client_id)
            .param("cid", channel_id);
        self.client.run(&cmd).await?.into_records()?;
        self.identity.channel_id = channel_id;
        Ok(())
    }
}
