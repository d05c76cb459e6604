//! Building blocks shared by the three-stage chain and the batch extractor.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ service ──▶ postprocess ──▶ stage ──▶ store / jsonl
//! (PDF)    (base64)   (HTTPS)    (cleanup)      (validate)  (disk)
//! ```
//!
//! 1. [`input`]: read the PDF and instruction templates
//! 2. [`encode`]: base64-wrap inline parts for the request body
//! 3. [`postprocess`]: strip fences and invisible characters from the reply
//! 4. [`stage`]: drive one call, parse and validate its JSON, check alignment
//! 5. [`store`]: atomic persistence of stage outputs
//! 6. [`jsonl`]: flatten extraction results into JSON Lines

pub mod encode;
pub mod input;
pub mod jsonl;
pub mod postprocess;
pub mod stage;
pub mod store;
