//! App - アプリケーション層
//!
//! ports と cache / pagination / search / drag を組み合わせてボードを動かします。
//!
//! # 主要コンポーネント
//! - **BoardBuilder**: セッションの構築とワイヤリング
//! - **BoardSession**: UI イベント (`BoardEvent`) の処理と表示用ビュー
//! - **GcLoop**: 使われなくなったキャッシュエントリの定期回収

pub mod builder;
pub mod gc_loop;
pub mod session;

// 主要な型を再エクスポート
pub use self::builder::{BoardBuilder, BuildError};
pub use self::gc_loop::GcLoop;
pub use self::session::{BoardEvent, BoardSession};
