/// Connection settings for a Supabase project and the room to play in.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub base_url: String,
    /// Anonymous API key sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Room code namespacing this game's rows.
    pub room: String,
}
