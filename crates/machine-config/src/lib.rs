//! 設定値の解決
//!
//! [`ConfigVarResolver`] は `ConfigVarString` / `ConfigVarBool` を具体的な値に解決します。
//! 優先順位は次の通り:
//!
//! 1. 直接指定された値 (`value`)
//! 2. Secret 参照 (`secretKeyRef`)
//! 3. ConfigMap 参照 (`configMapKeyRef`)
//! 4. 環境変数 (`*_or_env` 系のみ)
//!
//! Secret / ConfigMap の取得は [`ObjectStore`] 経由で行います。本番では
//! [`KubeObjectStore`]、テストでは [`InMemoryObjectStore`] を使用します。

pub mod error;
pub mod memory;
pub mod resolver;
pub mod store;

pub use error::{ConfigError, Result};
pub use memory::InMemoryObjectStore;
pub use resolver::{ConfigVarResolver, parse_bool};
pub use store::{KubeObjectStore, ObjectStore};
