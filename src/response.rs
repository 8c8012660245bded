//! Standard response envelope helpers.

use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

pub fn success_one<T: Serialize>(data: T) -> SuccessOne<T> {
    SuccessOne { data, meta: None }
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> SuccessMany<T> {
    let count = data.len() as u64;
    SuccessMany {
        data,
        meta: MetaCount { count },
    }
}
