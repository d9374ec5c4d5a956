pub mod blocks;
pub mod error;
pub mod matchers;
pub mod parser;
pub mod provider;
pub mod report;

pub use blocks::{MemoryUsage, ModuleContribution, Region, Section};
pub use error::{MapError, MapResult};
pub use parser::{
    parse_map_file, process_map, resolve_map_file, MapParser, MemoryUsageVisitor,
    OrphanModulePolicy, ParseOptions, MAP_FILE_BASE_NAME,
};
pub use provider::{LdProvider, MemoryUsageProvider, ProviderConfig, ProviderRegistry, SupportCache};
