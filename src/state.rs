//! Shared application state handed to every handler through `web::Data`.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::{
    AuthGuard, CredentialManager, PasswordResetWorkflow, TokenService, VerificationWorkflow,
};
use crate::config::Config;
use crate::mailer::Mailer;
use crate::store::memory::{MemoryBookStore, MemoryChapterStore, MemoryContentStore, MemoryUserStore};
use crate::store::postgres::{PgBookStore, PgChapterStore, PgContentStore, PgUserStore};
use crate::store::{BookStore, ChapterStore, ContentStore, UserStore};

/// One implementation per persistence capability.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub books: Arc<dyn BookStore>,
    pub chapters: Arc<dyn ChapterStore>,
    pub contents: Arc<dyn ContentStore>,
}

impl Stores {
    pub fn postgres(pool: &PgPool, config: &Config) -> Self {
        let deadline = config.db_timeout;
        Self {
            users: Arc::new(PgUserStore::new(pool.clone(), deadline)),
            books: Arc::new(PgBookStore::new(pool.clone(), deadline)),
            chapters: Arc::new(PgChapterStore::new(pool.clone(), deadline)),
            contents: Arc::new(PgContentStore::new(pool.clone(), deadline)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::default()),
            books: Arc::new(MemoryBookStore::default()),
            chapters: Arc::new(MemoryChapterStore::default()),
            contents: Arc::new(MemoryContentStore::default()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub books: Arc<dyn BookStore>,
    pub chapters: Arc<dyn ChapterStore>,
    pub contents: Arc<dyn ContentStore>,
    pub tokens: Arc<TokenService>,
    pub credentials: CredentialManager,
    pub verification: Arc<VerificationWorkflow>,
    pub password_reset: Arc<PasswordResetWorkflow>,
    pub guard: AuthGuard,
    /// Sets the `Secure` attribute on the auth cookie.
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(
        stores: Stores,
        tokens: Arc<TokenService>,
        mailer: Arc<dyn Mailer>,
        credentials: CredentialManager,
        app_base_url: &str,
        cookie_secure: bool,
    ) -> Self {
        let verification = VerificationWorkflow::new(stores.users.clone(), mailer.clone(), app_base_url);
        let password_reset =
            PasswordResetWorkflow::new(stores.users.clone(), mailer, credentials, app_base_url);
        let guard = AuthGuard::new(tokens.clone(), stores.users.clone());

        Self {
            users: stores.users,
            books: stores.books,
            chapters: stores.chapters,
            contents: stores.contents,
            tokens,
            credentials,
            verification: Arc::new(verification),
            password_reset: Arc::new(password_reset),
            guard,
            cookie_secure,
        }
    }

    /// Wires the Postgres stores and token keys described by `config`.
    pub fn from_config(pool: &PgPool, config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        let tokens = TokenService::new(&config.access_token, config.refresh_token.as_ref());
        Self::new(
            Stores::postgres(pool, config),
            Arc::new(tokens),
            mailer,
            CredentialManager::with_cost(config.bcrypt_cost),
            &config.app_base_url,
            config.cookie_secure,
        )
    }
}
