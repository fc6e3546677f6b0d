use std::{sync::Arc, time::Duration};

use ab_glyph::FontArc;
use anyhow::Context;
use tracing::info;

use super::{
    auth::{ClerkDirectory, IdentityDirectory, IdentityVerifier},
    config::{Config, StoreBackend},
    database::{MemoryStore, ProfileStore, RedisStore, redis_store::init_redis},
    og::load_font,
    storage::{BlobStore, MemoryBlobStore, S3BlobStore},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn ProfileStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub verifier: IdentityVerifier,
    pub directory: Arc<dyn IdentityDirectory>,
    pub http: reqwest::Client,
    pub font: Option<FontArc>,
}

impl State {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let verifier = IdentityVerifier::from_rsa_pem(&config.clerk_jwt_key)
            .context("CLERK_JWT_KEY is not a valid RSA public key")?;

        let directory = Arc::new(ClerkDirectory::new(
            http.clone(),
            &config.clerk_api_url,
            config.clerk_secret_key.clone(),
        ));

        let (store, blobs): (Arc<dyn ProfileStore>, Arc<dyn BlobStore>) =
            match config.store_backend {
                StoreBackend::Redis => {
                    let connection = init_redis(&config.redis_url)
                        .await
                        .context("Failed to connect to Redis")?;
                    let blobs =
                        S3BlobStore::new(&config.blob_bucket, &config.blob_public_url).await;

                    (Arc::new(RedisStore::new(connection)), Arc::new(blobs))
                }
                StoreBackend::Memory => {
                    info!("Using in-memory profile and blob stores");
                    (
                        Arc::new(MemoryStore::new()),
                        Arc::new(MemoryBlobStore::new(&config.blob_public_url)),
                    )
                }
            };

        let font = load_font(&config.og_font_path);

        Ok(Arc::new(Self {
            config,
            store,
            blobs,
            verifier,
            directory,
            http,
            font,
        }))
    }

    /// Wires already-built parts together; tests use this with in-memory stores.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn ProfileStore>,
        blobs: Arc<dyn BlobStore>,
        verifier: IdentityVerifier,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            blobs,
            verifier,
            directory,
            http: reqwest::Client::new(),
            font: None,
        })
    }
}
