//! HTTP REST API.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/scans` | POST | Record a scan or report the existing one |
//! | `/api/scans` | GET | List scans with filters and paging |
//! | `/api/scans` | DELETE | Delete every scan |
//! | `/api/scans/export` | GET | Download matching scans as `.xlsx` |
//! | `/api/scans/{id}` | GET | Get one scan |
//! | `/health` | GET | Liveness |
//! | `/ready` | GET | Readiness (storage probe) |
//! | `/metrics` | GET | Prometheus metrics |

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability, error_codes,
    ApiError, DEFAULT_BODY_LIMIT, WELCOME_MESSAGE,
};
pub use state::AppState;
