//! Per-entity transforms: renames to the warehouse vocabulary and derived
//! fields.
//!
//! All functions here are pure. A column the transform needs but cannot find
//! is a [`EtlError::MissingColumn`]; a value of the wrong type is a
//! [`EtlError::TypeMismatch`]. Both abort the run.

use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

use crate::error::EtlResult;
use crate::frame::{Frame, Value};

/// Share of the list price assumed to be cost when computing profit.
pub const COST_RATIO: f64 = 0.7;

pub const PERSON_COLUMNS: &[(&str, &str)] = &[
    ("BusinessEntityID", "id_pessoa"),
    ("FirstName", "primeiro_nome"),
    ("LastName", "sobrenome"),
    ("ModifiedDate", "data_modificacao"),
];

pub const CUSTOMER_COLUMNS: &[(&str, &str)] = &[
    ("CustomerID", "id_cliente"),
    ("PersonID", "id_pessoa"),
    ("Title", "titulo"),
    ("FirstName", "primeiro_nome"),
    ("MiddleName", "nome_meio"),
    ("LastName", "sobrenome"),
    ("AddressLine1", "endereco_linha1"),
    ("AddressLine2", "endereco_linha2"),
    ("City", "cidade"),
    ("StateProvinceCode", "estado_provincia_codigo"),
    ("StateProvinceName", "estado_provincia_nome"),
    ("CountryRegionCode", "pais_codigo"),
    ("CountryName", "pais_nome"),
    ("PostalCode", "cep"),
];

pub const PRODUCT_COLUMNS: &[(&str, &str)] = &[
    ("ProductID", "id_produto"),
    ("ProductName", "nome_produto"),
    ("SubcategoryName", "subcategoria"),
    ("CategoryName", "categoria"),
];

pub const TERRITORY_COLUMNS: &[(&str, &str)] = &[
    ("TerritoryID", "id_territorio"),
    ("TerritoryName", "nome_territorio"),
    ("Country", "pais"),
    ("Region", "regiao"),
];

/// Columns of the date dimension, in output order.
pub const DATE_COLUMNS: [&str; 7] = ["OrderDate", "DateID", "Ano", "Mes", "Dia", "Trimestre", "Semana"];

pub fn transform_person(mut frame: Frame) -> EtlResult<Frame> {
    frame.rename(PERSON_COLUMNS)?;

    let first = frame.column_index("primeiro_nome")?;
    let last = frame.column_index("sobrenome")?;
    let full_names = frame
        .rows()
        .iter()
        .map(|row| {
            let first = row[first].expect_text("primeiro_nome")?;
            let last = row[last].expect_text("sobrenome")?;
            Ok(full_name(first, last).into())
        })
        .collect::<EtlResult<Vec<Value>>>()?;

    frame.push_column("nome_completo", full_names)?;
    Ok(frame)
}

/// `first + " " + last`, untrimmed. A missing part makes the whole name missing.
pub fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    Some(format!("{} {}", first?, last?))
}

pub fn transform_customer(mut frame: Frame) -> EtlResult<Frame> {
    frame.rename(CUSTOMER_COLUMNS)?;
    Ok(frame)
}

pub fn transform_product(mut frame: Frame) -> EtlResult<Frame> {
    frame.rename(PRODUCT_COLUMNS)?;
    Ok(frame)
}

pub fn transform_territory(mut frame: Frame) -> EtlResult<Frame> {
    frame.rename(TERRITORY_COLUMNS)?;
    Ok(frame)
}

/// Add `DateID`, `Profit` and the `status` label to the sales fact.
pub fn transform_orders(mut frame: Frame) -> EtlResult<Frame> {
    let order_date = frame.column_index("OrderDate")?;
    let qty = frame.column_index("OrderQty")?;
    let price = frame.column_index("UnitPrice")?;
    let total = frame.column_index("LineTotal")?;
    let status = frame.column_index("Status")?;

    let mut date_ids = Vec::with_capacity(frame.len());
    let mut profits = Vec::with_capacity(frame.len());
    let mut labels = Vec::with_capacity(frame.len());

    for row in frame.rows() {
        let date = row[order_date].require_timestamp("OrderDate")?.date();
        date_ids.push(Value::Int(date_id(date)));

        let line_profit = match (
            row[qty].expect_number("OrderQty")?,
            row[price].expect_number("UnitPrice")?,
            row[total].expect_number("LineTotal")?,
        ) {
            (Some(q), Some(p), Some(t)) => Some(profit(q, p, t)),
            _ => None,
        };
        profits.push(Value::from(line_profit));

        let label = row[status].expect_int("Status")?.and_then(status_label);
        labels.push(Value::from(label));
    }

    frame.push_column("DateID", date_ids)?;
    frame.push_column("Profit", profits)?;
    frame.push_column("status", labels)?;
    Ok(frame)
}

/// Surrogate date key: `YYYYMMDD` as an integer.
pub fn date_id(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

/// `LineTotal - (OrderQty * UnitPrice * 0.7)`.
pub fn profit(order_qty: f64, unit_price: f64, line_total: f64) -> f64 {
    line_total - (order_qty * unit_price * COST_RATIO)
}

/// Order status label. Codes outside 1–6 have none.
pub fn status_label(code: i64) -> Option<&'static str> {
    match code {
        1 => Some("In Process"),
        2 => Some("Approved"),
        3 => Some("Backordered"),
        4 => Some("Rejected"),
        5 => Some("Shipped"),
        6 => Some("Canceled"),
        _ => None,
    }
}

/// Build the date dimension from the order lines.
///
/// One row per distinct `OrderDate` (exact timestamp match), in order of
/// first appearance. `Semana` is the ISO-8601 week number.
pub fn build_date_dimension(orders: &Frame) -> EtlResult<Frame> {
    let order_date = orders.column_index("OrderDate")?;
    let mut seen = HashSet::new();
    let mut frame = Frame::new(DATE_COLUMNS);

    for row in orders.rows() {
        let ts = row[order_date].require_timestamp("OrderDate")?;
        if !seen.insert(ts) {
            continue;
        }

        let date = ts.date();
        frame.push_row(vec![
            Value::Timestamp(ts),
            Value::Int(date_id(date)),
            Value::Int(i64::from(date.year())),
            Value::Int(i64::from(date.month())),
            Value::Int(i64::from(date.day())),
            Value::Int(i64::from(quarter(date))),
            Value::Int(i64::from(date.iso_week().week())),
        ])?;
    }

    Ok(frame)
}

fn quarter(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}
