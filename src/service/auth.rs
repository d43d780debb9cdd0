use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DbErr, SqlErr};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    domain::{Provider, Source},
    entities::{accounts, credentials},
    repo::{
        accounts::AccountsRepo,
        credentials::CredentialsRepo,
        unit_of_work::{new_identity, NewAccount, Scope, UnitOfWork},
    },
    service::{
        oauth::{OAuthError, OAuthExchange},
        otp::{OtpError, OtpVerifier},
        password::{PasswordError, PasswordHasher},
        token::{IssuedToken, TokenError, TokenIssuer},
    },
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("identity already exists")]
    IdentityAlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid {0}")]
    InvalidInput(&'static str),
    #[error("credential {credential_id} references missing account {account_id}")]
    ConsistencyFault {
        credential_id: Uuid,
        account_id: Uuid,
    },
    #[error("external exchange failed: {0}")]
    ExternalExchangeFailed(#[from] OAuthError),
    #[error("code verification unavailable: {0}")]
    VerificationUnavailable(#[from] OtpError),
    #[error("provider {0} is not supported")]
    UnsupportedProvider(Provider),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("store error: {0}")]
    Store(#[from] DbErr),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::IdentityAlreadyExists => "identity_already_exists",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidInput(_) => "invalid_input",
            AuthError::ConsistencyFault { .. } => "internal_error",
            AuthError::ExternalExchangeFailed(_) => "external_exchange_failed",
            AuthError::VerificationUnavailable(_) => "verification_unavailable",
            AuthError::UnsupportedProvider(_) => "unsupported_provider",
            AuthError::Password(_) | AuthError::Token(_) | AuthError::Store(_) => "internal_error",
        }
    }

    fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            AuthError::Store(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        )
    }
}

/// Provider-tagged login input; each variant is handled by one strategy.
#[derive(Clone, Debug)]
pub enum LoginCredentials {
    Email {
        email: String,
        password: String,
    },
    Phone {
        phone: String,
        code: String,
        source: Source,
    },
    Wechat {
        code: String,
        source: Source,
    },
    Google {
        id_token: String,
    },
}

#[derive(Debug)]
pub struct AuthOutput {
    pub account: accounts::Model,
    pub token: IssuedToken,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn register_with_email(
        &self,
        email: &str,
        password: &str,
        source: Source,
    ) -> Result<AuthOutput, AuthError>;
    async fn login_with_email(&self, email: &str, password: &str)
        -> Result<AuthOutput, AuthError>;
    async fn login_or_register_with_wechat(
        &self,
        code: &str,
        source: Source,
    ) -> Result<AuthOutput, AuthError>;
    async fn login_or_register_with_phone(
        &self,
        phone: &str,
        code: &str,
        source: Source,
    ) -> Result<AuthOutput, AuthError>;
    async fn resolve(&self, credentials: LoginCredentials) -> Result<AuthOutput, AuthError>;
}

pub struct AuthServiceImpl {
    uow: Arc<UnitOfWork>,
    accounts_repo: Arc<dyn AccountsRepo>,
    credentials_repo: Arc<dyn CredentialsRepo>,
    hasher: Arc<PasswordHasher>,
    tokens: Arc<TokenIssuer>,
    wechat: Option<Arc<dyn OAuthExchange>>,
    otp: Option<Arc<dyn OtpVerifier>>,
}

impl AuthServiceImpl {
    pub fn new(
        uow: Arc<UnitOfWork>,
        accounts_repo: Arc<dyn AccountsRepo>,
        credentials_repo: Arc<dyn CredentialsRepo>,
        hasher: Arc<PasswordHasher>,
        tokens: Arc<TokenIssuer>,
        wechat: Option<Arc<dyn OAuthExchange>>,
        otp: Option<Arc<dyn OtpVerifier>>,
    ) -> Self {
        Self {
            uow,
            accounts_repo,
            credentials_repo,
            hasher,
            tokens,
            wechat,
            otp,
        }
    }

    fn normalize_email(email: &str) -> Result<String, AuthError> {
        let value = email.trim().to_lowercase();
        if value.is_empty() || !value.contains('@') {
            return Err(AuthError::InvalidInput("email"));
        }
        Ok(value)
    }

    fn validate_password(password: &str) -> Result<(), AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput("password"));
        }
        Ok(())
    }

    /// Accepts an optional leading `+` followed by digits; spaces and dashes are dropped.
    fn normalize_phone(phone: &str) -> Result<String, AuthError> {
        let value: String = phone
            .trim()
            .chars()
            .filter(|ch| *ch != ' ' && *ch != '-')
            .collect();
        let digits = value.strip_prefix('+').unwrap_or(&value);
        if digits.len() < 5 || digits.len() > 20 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(AuthError::InvalidInput("phone"));
        }
        Ok(value)
    }

    fn require_code(code: &str) -> Result<&str, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::InvalidInput("code"));
        }
        Ok(code)
    }

    fn complete(&self, account: accounts::Model) -> Result<AuthOutput, AuthError> {
        let token = self.tokens.issue(account.id)?;
        Ok(AuthOutput { account, token })
    }

    /// Find-or-create keyed by (provider, subject). A unique violation means a
    /// concurrent request created the identity first, so the lookup runs once
    /// more and resolves as a login.
    async fn find_or_create(
        &self,
        provider: Provider,
        subject: String,
        account: NewAccount,
    ) -> Result<accounts::Model, AuthError> {
        match self
            .resolve_once(provider, subject.clone(), account.clone())
            .await
        {
            Err(err) if err.is_unique_violation() => {
                debug!(%provider, "identity created concurrently; resolving again");
                match self.resolve_once(provider, subject, account).await {
                    Err(err) if err.is_unique_violation() => Err(AuthError::IdentityAlreadyExists),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn resolve_once(
        &self,
        provider: Provider,
        subject: String,
        account: NewAccount,
    ) -> Result<accounts::Model, AuthError> {
        self.uow
            .execute(move |scope| {
                Box::pin(async move {
                    if let Some(credential) = scope
                        .credentials()
                        .find_by_provider(provider, &subject)
                        .await?
                    {
                        return load_owner(&scope, &credential).await;
                    }

                    let (account, credential) =
                        new_identity(Utc::now(), account, provider, subject, None);
                    let account = scope.accounts().create(account).await?;
                    scope.credentials().create(credential).await?;
                    info!(account_id = %account.id, %provider, "account created");
                    Ok(account)
                })
            })
            .await
    }
}

async fn load_owner(
    scope: &Scope<'_>,
    credential: &credentials::Model,
) -> Result<accounts::Model, AuthError> {
    let owner = scope
        .accounts()
        .find_including_deleted(credential.account_id)
        .await?;
    check_owner(credential, owner)
}

/// A soft-deleted owner cannot sign in; a missing one is a broken invariant.
fn check_owner(
    credential: &credentials::Model,
    owner: Option<accounts::Model>,
) -> Result<accounts::Model, AuthError> {
    match owner {
        Some(account) if account.deleted_at.is_some() => Err(AuthError::InvalidCredentials),
        Some(account) => Ok(account),
        None => {
            error!(
                credential_id = %credential.id,
                account_id = %credential.account_id,
                "credential references a missing account"
            );
            Err(AuthError::ConsistencyFault {
                credential_id: credential.id,
                account_id: credential.account_id,
            })
        }
    }
}

#[async_trait]
impl AuthService for AuthServiceImpl {
    async fn register_with_email(
        &self,
        email: &str,
        password: &str,
        source: Source,
    ) -> Result<AuthOutput, AuthError> {
        let email = Self::normalize_email(email)?;
        Self::validate_password(password)?;
        let password_hash = self.hasher.hash(password)?;

        let account = self
            .uow
            .execute(move |scope| {
                Box::pin(async move {
                    if scope.accounts().find_by_email(&email).await?.is_some() {
                        return Err(AuthError::IdentityAlreadyExists);
                    }

                    let (account, credential) = new_identity(
                        Utc::now(),
                        NewAccount {
                            email: Some(email.clone()),
                            phone: None,
                            source,
                        },
                        Provider::Email,
                        email,
                        Some(password_hash),
                    );
                    let account = scope.accounts().create(account).await?;
                    scope.credentials().create(credential).await?;
                    Ok::<_, AuthError>(account)
                })
            })
            .await
            .map_err(|err| {
                if err.is_unique_violation() {
                    AuthError::IdentityAlreadyExists
                } else {
                    err
                }
            })?;

        info!(account_id = %account.id, "account registered with email");
        self.complete(account)
    }

    async fn login_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthOutput, AuthError> {
        let email = Self::normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password"));
        }

        let Some(credential) = self
            .credentials_repo
            .find_by_provider_subject(Provider::Email, &email)
            .await?
        else {
            self.hasher.burn(password);
            return Err(AuthError::InvalidCredentials);
        };

        let hash = credential.password_hash.as_deref().unwrap_or_default();
        if !self.hasher.verify(hash, password) {
            return Err(AuthError::InvalidCredentials);
        }

        let owner = self
            .accounts_repo
            .find_including_deleted(credential.account_id)
            .await?;
        let account = check_owner(&credential, owner)?;
        self.complete(account)
    }

    async fn login_or_register_with_wechat(
        &self,
        code: &str,
        source: Source,
    ) -> Result<AuthOutput, AuthError> {
        let Some(wechat) = &self.wechat else {
            return Err(AuthError::UnsupportedProvider(Provider::Wechat));
        };
        let code = Self::require_code(code)?;
        let subject = wechat.exchange_code_for_subject(code).await?;

        let account = self
            .find_or_create(
                Provider::Wechat,
                subject,
                NewAccount {
                    email: None,
                    phone: None,
                    source,
                },
            )
            .await?;
        self.complete(account)
    }

    async fn login_or_register_with_phone(
        &self,
        phone: &str,
        code: &str,
        source: Source,
    ) -> Result<AuthOutput, AuthError> {
        let Some(otp) = &self.otp else {
            return Err(AuthError::UnsupportedProvider(Provider::Phone));
        };
        let phone = Self::normalize_phone(phone)?;
        let code = Self::require_code(code)?;

        if !otp.verify(&phone, code).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let account = self
            .find_or_create(
                Provider::Phone,
                phone.clone(),
                NewAccount {
                    email: None,
                    phone: Some(phone),
                    source,
                },
            )
            .await?;
        self.complete(account)
    }

    async fn resolve(&self, credentials: LoginCredentials) -> Result<AuthOutput, AuthError> {
        match credentials {
            LoginCredentials::Email { email, password } => {
                self.login_with_email(&email, &password).await
            }
            LoginCredentials::Phone {
                phone,
                code,
                source,
            } => self.login_or_register_with_phone(&phone, &code, source).await,
            LoginCredentials::Wechat { code, source } => {
                self.login_or_register_with_wechat(&code, source).await
            }
            LoginCredentials::Google { .. } => Err(AuthError::UnsupportedProvider(Provider::Google)),
        }
    }
}
