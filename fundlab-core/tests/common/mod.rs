//! Shared fixtures: payload files for three kinds and an ingested session.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use fundlab_core::fetch::LogProgress;
use fundlab_core::{DataKind, FetchSummary, PayloadDirSource, RawRecord, Session};
use serde_json::json;
use tempfile::TempDir;

pub fn raw(value: serde_json::Value) -> RawRecord {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// 1301 and 7203 are complete. 8306 has a single Q4 row, so growth is
/// undefined for it. 9984 has company and indicator data only.
pub fn write_payloads(dir: &Path) {
    fs::create_dir_all(dir).unwrap();

    let company = json!({
        "column_description": {
            "company_name_en": {"name_jp": "会社名(英語)"},
            "tosyo_33category": {"name_jp": "東証33業種"}
        },
        "1301": [{"company_name_en": "Kyokuyo", "tosyo_33category": "Fishery"}],
        "7203": [{"company_name_en": "Toyota", "tosyo_33category": "Transportation Equipment"}],
        "8306": [{"company_name_en": "MUFG", "tosyo_33category": "Banks"}],
        "9984": [{"company_name_en": "SoftBank", "tosyo_33category": "Information & Communication"}]
    });

    let quarter = json!({
        "column_description": {
            "fiscal_year": {"name_jp": "会計年度"},
            "fiscal_quarter": {"name_jp": "四半期"},
            "net_sales": {"name_jp": "売上高", "unit": "百万円"},
            "submit_date": {"name_jp": "提出日"}
        },
        "1301": [
            {"fiscal_year": 2019, "fiscal_quarter": 4, "net_sales": 100, "submit_date": "2019-05-10"},
            {"fiscal_year": 2020, "fiscal_quarter": 4, "net_sales": 110, "submit_date": "2020-05-11"},
            {"fiscal_year": 2021, "fiscal_quarter": 4, "net_sales": 121, "submit_date": "2021-05-12"},
            {"fiscal_year": 2022, "fiscal_quarter": 1, "net_sales": 30, "submit_date": "2021-08-05"}
        ],
        "7203": [
            {"fiscal_year": 2019, "fiscal_quarter": 4, "net_sales": 200, "submit_date": "2019-05-08"},
            {"fiscal_year": 2020, "fiscal_quarter": 4, "net_sales": 180, "submit_date": "2020-05-12"},
            {"fiscal_year": 2021, "fiscal_quarter": 4, "net_sales": 242, "submit_date": "2021-05-12"}
        ],
        "8306": [
            {"fiscal_year": 2021, "fiscal_quarter": 4, "net_sales": 500, "submit_date": "2021-05-17"}
        ]
    });

    let indicator = json!({
        "column_description": {
            "pbr": {"name_jp": "PBR", "unit": "倍"},
            "per": {"name_jp": "PER", "unit": "倍"},
            "market_capital": {"name_jp": "時価総額", "unit": "百万円"}
        },
        "1301": [{"pbr": 0.8, "per": 7.5, "market_capital": 30000}],
        "7203": [{"pbr": 1.1, "per": 9.0, "market_capital": 300000}],
        "8306": [{"pbr": 0.6, "per": null, "market_capital": 100000}],
        "9984": [{"pbr": 1.5, "per": 20.0, "market_capital": 150000}]
    });

    for (kind, body) in [
        (DataKind::Company, company),
        (DataKind::Quarter, quarter),
        (DataKind::Indicator, indicator),
    ] {
        fs::write(
            dir.join(format!("{kind}.json")),
            serde_json::to_vec_pretty(&body).unwrap(),
        )
        .unwrap();
    }
}

pub fn ingest(session: &Session, payloads: &Path, kind: DataKind) -> FetchSummary {
    let source = Arc::new(PayloadDirSource::new(payloads));
    session
        .fetch_task(source, session.fetch_options(kind))
        .run(&LogProgress)
        .unwrap()
}

/// A temp root with every payload kind ingested.
pub struct Fixture {
    pub tmp: TempDir,
    pub session: Session,
}

impl Fixture {
    pub fn payload_dir(&self) -> std::path::PathBuf {
        self.tmp.path().join("payloads")
    }
}

pub fn ingested() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let payloads = tmp.path().join("payloads");
    write_payloads(&payloads);

    let session = Session::open(tmp.path().join("data")).unwrap();
    for kind in [DataKind::Company, DataKind::Quarter, DataKind::Indicator] {
        let summary = ingest(&session, &payloads, kind);
        assert!(summary.all_succeeded(), "{kind}: {summary:?}");
    }
    Fixture { tmp, session }
}
