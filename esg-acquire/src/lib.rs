pub mod extract;
pub mod fetcher;
pub mod guard;

pub use extract::{clean_inline_text, postprocess, MAX_TEXT_CHARS};
pub use fetcher::{AcquirerConfig, ContentAcquirer, FetchedContent, MAX_REDIRECTS};
pub use guard::{canonicalize_url, is_disallowed_ip, validate_url};
