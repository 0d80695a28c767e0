pub mod encrypt;
pub mod keygen;
pub mod register;
pub mod serve;
pub mod tokenize;

pub use encrypt::encrypt;
pub use keygen::keygen;
pub use register::register;
pub use serve::serve;
pub use tokenize::tokenize;
