pub use echoes_api_types::{ExtensionKind, Layout, MediaKind, MediaSource, RecommendationSource};
