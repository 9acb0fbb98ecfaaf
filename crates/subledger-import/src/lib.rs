pub mod build;
pub mod group;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod report;
pub mod validate;

pub use pipeline::{BatchOptions, GroupCheck, check_batch, import_file, import_rows};
pub use reader::{ReadError, read_rows, read_rows_from};
pub use registry::{IdentifierError, IdentifierRegistry, Minted};
pub use report::{BatchReport, GroupError, GroupOutcome, GroupStatus};
