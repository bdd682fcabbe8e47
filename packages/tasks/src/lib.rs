// ABOUTME: Task store for Task Master
// ABOUTME: Keeps the signed-in identity's tasks in sync with the hosted task table

pub mod error;
pub mod memory;
pub mod store;
pub mod table;

pub use error::{TaskError, TaskResult};
pub use memory::InMemoryTableStore;
pub use store::{TaskSnapshot, TaskStore};
pub use table::{
    NewTaskRow, StoreError, StoreResult, TableStore, TaskOrder, TaskPatch, TaskQuery,
};
