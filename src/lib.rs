pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod queries;

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::db::MIGRATOR;
    use crate::import::reader::FeedDirectory;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;
    use std::path::Path;
    use testcontainers::{ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner};
    use testcontainers_modules::postgres::Postgres;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TestDatabaseError {
        #[error("database error: {0}")]
        Sqlx(#[from] sqlx::Error),
        #[error("migration error: {0}")]
        Migration(#[from] sqlx::migrate::MigrateError),
        #[error("container error: {0}")]
        Container(#[from] TestcontainersError),
    }

    /// Disposable Postgres instance with the schema applied, one container
    /// per test. The container is torn down when the value drops.
    pub struct TestDatabase {
        pool: PgPool,
        _container: ContainerAsync<Postgres>,
    }

    impl TestDatabase {
        pub async fn new() -> Result<Self, TestDatabaseError> {
            let container = Postgres::default().start().await?;
            let host = container.get_host().await?;
            let port = container.get_host_port_ipv4(5432).await?;
            let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;

            MIGRATOR.run(&pool).await?;

            Ok(Self {
                pool,
                _container: container,
            })
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }

        pub fn pool_clone(&self) -> PgPool {
            self.pool.clone()
        }
    }

    /// Feed directory built file by file inside a tempdir.
    pub struct FeedFixture {
        dir: tempfile::TempDir,
    }

    impl FeedFixture {
        pub fn new() -> std::io::Result<Self> {
            Ok(Self {
                dir: tempfile::tempdir()?,
            })
        }

        pub fn write(&self, file_name: &str, contents: &str) -> std::io::Result<()> {
            std::fs::write(self.dir.path().join(file_name), contents)
        }

        pub fn path(&self) -> &Path {
            self.dir.path()
        }

        pub fn directory(&self) -> FeedDirectory {
            FeedDirectory::new(self.dir.path())
        }
    }
}
