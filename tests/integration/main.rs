//! Integration tests: full scan cycles over a deterministic provider.

mod mock_provider;
mod scan_cycle;
