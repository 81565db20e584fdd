// Aggregates challenge classification and the sandboxed interstitial solver.

pub mod detector;
pub mod solver;

pub use detector::{
    detect_challenge, extract_script_content, extract_sitekey, CaptchaKind, Challenge,
};
pub use solver::{JsSolver, SolveError, SolveResult};
