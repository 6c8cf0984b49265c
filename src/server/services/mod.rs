pub mod cache_services;
pub mod chapter_services;
pub mod dramabox_services;
pub mod edge_services;
pub mod fetch_services;
pub mod keyword_services;
pub mod signer_services;

pub use cache_services::DynCacheService;
pub use chapter_services::DynChapterService;
pub use dramabox_services::DynDramaboxService;
pub use keyword_services::DynKeywordService;
pub use signer_services::DynSigner;
