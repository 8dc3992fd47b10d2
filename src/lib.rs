//! College Mail Sorter
//!
//! Files unlabelled college admissions mail in Gmail under one nested label
//! per sender, e.g. `College/Stanford Admissions`.
//!
//! # Example Usage
//!
//! ```no_run
//! use college_mail_sorter::{
//!     auth::{FileCredentialStore, REQUIRED_SCOPES},
//!     cli,
//!     config::Config,
//!     login::InstalledAppFlow,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let store = FileCredentialStore::new("token.json");
//!     let flow = InstalledAppFlow::new("credentials.json", REQUIRED_SCOPES);
//!
//!     let report = cli::run(&config, &store, &flow).await?;
//!     println!("{}", cli::format_report(&report));
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Credential lifecycle and Gmail hub construction
//! - [`login`] - Installed-app OAuth2 flow with a loopback callback listener
//! - [`client`] - `MailService` trait and its Gmail API implementation
//! - [`label_manager`] - Label lookup and creation
//! - [`classifier`] - Sender-based labelling pass
//! - [`cli`] - Command-line interface and run orchestration
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod label_manager;
pub mod login;
pub mod models;

pub use error::{Result, SorterError};

pub use models::{ClassificationReport, LabelInfo, MessageDetail, MessageHeader, MessageRef};

pub use auth::{
    authenticate, AuthFlow, Credential, CredentialState, CredentialStore, FileCredentialStore,
};
pub use classifier::MailClassifier;
pub use client::{GmailService, MailService};
pub use config::Config;
pub use label_manager::{LabelManager, LabelResolution};
pub use login::InstalledAppFlow;
