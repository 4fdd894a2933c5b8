pub mod field_definition;
pub mod field_type;
pub mod identity;
pub mod iteration;
pub mod kind;
pub mod work_item;
pub mod work_item_type;

pub use field_definition::FieldDefinition;
pub use field_type::{ConversionError, FieldType};
pub use identity::Identity;
pub use iteration::{Iteration, IterationState, NewIteration, WorkItemCounts};
pub use kind::Kind;
pub use work_item::WorkItem;
pub use work_item_type::WorkItemType;
