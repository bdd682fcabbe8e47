// ABOUTME: Redirect-based sign-in helpers shared by auth service adapters
// ABOUTME: Includes PKCE, the local callback server, and provider definitions

pub mod pkce;
pub mod provider;
pub mod server;

pub use pkce::PkceChallenge;
pub use provider::OAuthProvider;
pub use server::{CallbackParams, CallbackServer, CALLBACK_PATH};
