pub mod error;
pub mod settings;
pub mod supabase;

pub use error::SupabaseError;
pub use supabase::SupabaseClient;
