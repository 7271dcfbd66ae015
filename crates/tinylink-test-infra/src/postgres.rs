use crate::Result;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage};
use typed_builder::TypedBuilder;

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_PORT: u16 = 5432;
const READY_MESSAGE: &str = "database system is ready to accept connections";

/// Credentials and image of a disposable PostgreSQL server.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PostgresConfig {
    /// Database created by the image entrypoint.
    #[builder(default = "tinylink".to_string(), setter(into))]
    database: String,
    /// Superuser of the server.
    #[builder(default = "tinylink".to_string(), setter(into))]
    username: String,
    #[builder(default = "tinylink".to_string(), setter(into))]
    password: String,
    #[builder(default = "16-alpine".to_string(), setter(into))]
    tag: String,
}

impl PostgresConfig {
    fn image(&self) -> ContainerRequest<GenericImage> {
        GenericImage::new(POSTGRES_IMAGE, self.tag.as_str())
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY_MESSAGE))
            .with_env_var("POSTGRES_DB", self.database.as_str())
            .with_env_var("POSTGRES_USER", self.username.as_str())
            .with_env_var("POSTGRES_PASSWORD", self.password.as_str())
    }
}

/// Test fixture for a disposable PostgreSQL server.
///
/// The entrypoint starts a temporary server to create the database, stops it
/// and starts the real one, so the ready message can show up before the final
/// server listens. Callers should retry their first connection.
pub struct PostgresServer {
    container: ContainerAsync<GenericImage>,
    config: PostgresConfig,
}

impl PostgresServer {
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let container = config.image().start().await?;
        Ok(Self { container, config })
    }

    /// Starts a server with the default credentials.
    pub async fn start_default() -> Result<Self> {
        Self::new(PostgresConfig::builder().build()).await
    }

    pub async fn host(&self) -> Result<String> {
        Ok(self.container.get_host().await?.to_string())
    }

    pub async fn port(&self) -> Result<u16> {
        Ok(self.container.get_host_port_ipv4(POSTGRES_PORT).await?)
    }

    /// Connection string for the configured database.
    pub async fn database_url(&self) -> Result<String> {
        self.database_url_for(&self.config.database).await
    }

    /// Connection string for `database` on the same server, which need not
    /// exist yet.
    pub async fn database_url_for(&self, database: &str) -> Result<String> {
        let host = self.host().await?;
        let port = self.port().await?;
        let PostgresConfig {
            username, password, ..
        } = &self.config;
        Ok(format!(
            "postgres://{username}:{password}@{host}:{port}/{database}"
        ))
    }

    pub fn container(&self) -> &ContainerAsync<GenericImage> {
        &self.container
    }
}
