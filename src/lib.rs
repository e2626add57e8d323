//! # aw-etl: AdventureWorks to PostgreSQL star schema
//!
//! A batch ETL that reads the AdventureWorks sample database on SQL Server
//! and rebuilds a small star schema in PostgreSQL: four dimensions, one fact
//! table, and a calendar dimension derived from the fact table's order dates.
//!
//! Every run replaces all six tables wholesale. There is no incremental
//! load and no history.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use aw_etl::prelude::*;
//!
//! let config = EtlConfig::load_or_default(None)?;
//! let report = aw_etl::execute(&config).await?;
//! println!("{} rows in {} ms", report.total_rows(), report.elapsed_ms);
//! ```
//!
//! ## Outputs
//!
//! | Step      | Table            | Source                                   |
//! |-----------|------------------|------------------------------------------|
//! | person    | `dim_pessoa`     | `Person.Person`                          |
//! | customer  | `dim_cliente`    | `Sales.Customer` + person + address      |
//! | product   | `dim_produto`    | `Production.Product` + category          |
//! | territory | `dim_territorio` | `Sales.SalesTerritory`                   |
//! | orders    | `fato_vendas`    | order headers × order lines              |
//! | date      | `dim_data`       | distinct order dates of `fato_vendas`    |

pub mod config;
pub mod conn_string;
pub mod entity;
pub mod error;
pub mod extract;
pub mod frame;
pub mod load;
pub mod mssql;
pub mod pipeline;
pub mod transform;

pub mod prelude {
    pub use crate::config::{EtlConfig, LoadOptions, LoadStrategy};
    pub use crate::entity::Entity;
    pub use crate::error::{EtlError, EtlResult};
    pub use crate::extract::Source;
    pub use crate::frame::{Frame, Value};
    pub use crate::load::Destination;
    pub use crate::pipeline::{RunReport, StepReport};
}

pub use config::EtlConfig;
pub use error::{EtlError, EtlResult};
pub use pipeline::{execute, execute_dry_run, run, run_pipeline};
