pub mod todo;

pub use todo::{NewTodo, Snapshot, Todo, TodoPatch};
