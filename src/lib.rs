pub mod assets;
pub mod bail;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error_page;
pub mod exception;
pub mod ignore;
pub mod middleware;
pub mod param;
pub mod request;
pub mod response;
pub mod server;
pub mod util;

pub use assets::{AssetStore, ExtensionMime, FsAssetStore, MimeResolver, StaticAssets};
pub use chain::{compose, Arity, Chain, ErrorMiddleware, Flow, Handler, Middleware};
pub use config::Config;
pub use error_page::{IdentityTranslator, PageRenderer, ShellRenderer, StackTranslator};
pub use exception::{AssetError, Exception, HandlerError};
pub use ignore::{should_ignore, IgnoreSpec};
pub use middleware::{middleware, Collaborators, MiddlewareOptions};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use util::HtmlBuilder;
