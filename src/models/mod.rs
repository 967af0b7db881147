pub mod book;
pub mod chapter;
pub mod content;
pub mod user;

pub use book::{Book, BookInput, BookUpdate, NewBook};
pub use chapter::{Chapter, ChapterInput, ChapterUpdate, NewChapter};
pub use content::{Content, ContentInput};
pub use user::{NewUser, ProfileUpdate, User, UserStatus};
