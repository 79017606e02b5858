//! One module per subcommand, each exposing `execute`.

pub mod change_password;
pub mod decrypt;
pub mod delete;
pub mod encrypt;
pub mod get;
pub mod hash_password;
pub mod init;
pub mod list;
pub mod rekey;
pub mod reset;
pub mod set;
pub mod status;
