//! Integration tests for sie-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sie_core::{
    encoding::encode,
    export_ledger, parse, parse_bytes,
    utils::{EnhancedAccountValidator, EnhancedVerificationValidator, MemoryStorage},
    BalansTyp, DefaultAccountValidator, ExportConfig, ImportLocks, ImportSettings, LedgerStorage,
    SieError, SieGenerator, SieImporter, Verifikation, VerificationKey,
};

const SAMPLE: &str = r#"#FLAGGA 0
#PROGRAM "Bokföringsprogrammet" 3.1
#FORMAT PC8
#GEN 20250110
#SIETYP 4
#ORGNR 556677-8899
#FNAMN "Exempelbolaget AB"
#RAR 0 20240101 20241231
#RAR -1 20230101 20231231
#KPTYP BAS2014
#KONTO 1930 "Företagskonto"
#KONTO 2440 "Leverantörsskulder"
#KONTO 3001 "Försäljning inom Sverige, 25 % moms"
#KONTO 7210 "Löner till tjänstemän"
#KTYP 1930 T
#IB 0 1930 15000.00
#IB -1 1930 9000.00
#UB 0 1930 20000.00
#UB 0 2440 -1000.00
#RES 0 3001 -10000.00
#RES 0 7210 4000.00

#VER A 1 20240115 "Kontantförsäljning" 20240116
{
   #TRANS 1930 {} 10000.00
   #TRANS 3001 {} -10000.00
}
#VER A 2 20240125 "Löneutbetalning"
{
   #TRANS 7210 {} 4000,00
   #TRANS 1930 {} -4000,00
}
#VER B 1 20241231 "Betalning leverantör"
{
   #TRANS 2440 {} 1000.00
   #TRANS 1930 {} -1000.00
}
"#;

const MISSING_ACCOUNT: &str = r#"#FLAGGA 0
#KONTO 1930 "Företagskonto"
#KONTO 7210 "Löner till tjänstemän"
#VER A 1 20240301 "Försäljning"
{
   #TRANS 1930 {} 500.00
   #TRANS 3001 {} -500.00
}
#VER A 2 20240325 "Lön"
{
   #TRANS 7210 {} 200.00
   #TRANS 1930 {} -200.00
}
"#;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_import_sample_file() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());

    let resultat = importer
        .import_bytes(&encode(SAMPLE), "text/plain", &ImportSettings::default())
        .await
        .unwrap();

    assert!(resultat.fel.is_empty(), "{:?}", resultat.fel);
    assert_eq!(resultat.skapade_konton, 4);
    assert_eq!(resultat.importerade_verifikationer, 3);
    // the previous year's #IB is a comparison figure and is not materialised
    assert_eq!(resultat.importerade_balanser, 3);
    assert_eq!(resultat.importerade_resultat, 2);
    assert_eq!(resultat.antal_dubbletter, 0);

    let konton = storage.list_accounts().await.unwrap();
    let bank = konton.iter().find(|k| k.nummer == "1930").unwrap();
    assert_eq!(bank.namn, "Företagskonto");

    let rows = storage.list_verifications().await.unwrap();
    let lon = rows
        .iter()
        .find(|r| r.verifikation.key() == VerificationKey::new("A", "2"))
        .unwrap();
    assert_eq!(lon.verifikation.transaktioner[0].belopp, BigDecimal::from(4000));
    assert!(rows.iter().all(|r| r.verifikation.is_balanced()));
}

#[tokio::test]
async fn test_second_import_is_idempotent() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());
    let settings = ImportSettings::default();

    let first = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &settings)
        .await
        .unwrap();
    let second = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &settings)
        .await
        .unwrap();

    assert_eq!(second.importerade_verifikationer, 0);
    assert_eq!(second.antal_dubbletter, first.importerade_verifikationer);
    assert_eq!(second.skapade_konton, 0);
    assert_ne!(first.import_id, second.import_id);

    assert_eq!(storage.list_verifications().await.unwrap().len(), 3);
    // balances are replaced, not duplicated
    assert_eq!(storage.list_balances(BalansTyp::Ingaende).await.unwrap().len(), 1);
    assert_eq!(storage.list_balances(BalansTyp::Utgaende).await.unwrap().len(), 2);
    assert_eq!(storage.list_results().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_account_is_rejected_without_auto_create() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());

    let resultat = importer
        .import_bytes(MISSING_ACCOUNT.as_bytes(), "", &ImportSettings::default())
        .await
        .unwrap();

    assert_eq!(resultat.skapade_konton, 2);
    assert_eq!(resultat.importerade_verifikationer, 1);
    assert_eq!(resultat.fel.len(), 1);
    assert!(resultat.fel[0].contains("3001"));
    assert!(resultat.fel[0].contains("A1"));

    let konton = storage.list_accounts().await.unwrap();
    assert!(konton.iter().all(|k| k.nummer != "3001"));
}

#[tokio::test]
async fn test_missing_account_is_created_when_allowed() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());
    let settings = ImportSettings {
        skapa_konton: true,
        ..Default::default()
    };

    let resultat = importer
        .import_bytes(MISSING_ACCOUNT.as_bytes(), "", &settings)
        .await
        .unwrap();

    assert!(resultat.fel.is_empty(), "{:?}", resultat.fel);
    assert_eq!(resultat.skapade_konton, 3);
    assert_eq!(resultat.importerade_verifikationer, 2);

    let konton = storage.list_accounts().await.unwrap();
    let created = konton.iter().find(|k| k.nummer == "3001").unwrap();
    assert_eq!(created.namn, "Konto 3001");
}

#[tokio::test]
async fn test_unbalanced_verification_is_excluded() {
    let text = "#KONTO 1930 Bank\n#KONTO 3001 Försäljning\n\
                #VER A 1 20240110 \"Fel\"\n{\n#TRANS 1930 {} 1050\n#TRANS 3001 {} -1000\n}\n\
                #VER A 2 20240111 \"Rätt\"\n{\n#TRANS 1930 {} 1000\n#TRANS 3001 {} -1000\n}\n";
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());

    let resultat = importer
        .import_bytes(text.as_bytes(), "text/plain", &ImportSettings::default())
        .await
        .unwrap();

    assert_eq!(resultat.importerade_verifikationer, 1);
    assert_eq!(resultat.fel.len(), 1);
    assert!(resultat.fel[0].contains("A1"));
    assert!(resultat.fel[0].contains("obalanserad"));

    let rows = storage.list_verifications().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].verifikation.nummer, "2");
}

#[tokio::test]
async fn test_date_range_boundaries_are_inclusive() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());
    let settings = ImportSettings {
        start_datum: Some(date(2024, 1, 15)),
        slut_datum: Some(date(2024, 1, 25)),
        ..Default::default()
    };

    let resultat = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &settings)
        .await
        .unwrap();

    // A1 is on the start date and A2 on the end date, B1 is outside
    assert_eq!(resultat.importerade_verifikationer, 2);
    // #IB is dated at the year start and #UB/#RES at the year end
    assert_eq!(resultat.importerade_balanser, 0);
    assert_eq!(resultat.importerade_resultat, 0);

    let keys: Vec<_> = storage
        .list_verifications()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.verifikation.key().to_string())
        .collect();
    assert_eq!(keys, vec!["A1", "A2"]);
}

#[tokio::test]
async fn test_excluded_verification_and_category_toggle() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());
    let mut settings = ImportSettings {
        inkludera_balanser: false,
        ..Default::default()
    };
    settings
        .exkludera_verifikationer
        .insert(VerificationKey::new("B", "1"));

    let resultat = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &settings)
        .await
        .unwrap();

    assert_eq!(resultat.importerade_verifikationer, 2);
    assert_eq!(resultat.importerade_balanser, 0);
    assert_eq!(resultat.importerade_resultat, 2);
    assert!(storage.list_balances(BalansTyp::Utgaende).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_failure_reports_partial_counts() {
    let storage = MemoryStorage::new();
    // four accounts and one verification succeed, the second verification fails
    storage.fail_after(5).unwrap();
    let mut importer = SieImporter::new(storage.clone());
    let settings = ImportSettings::default();

    let err = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &settings)
        .await
        .unwrap_err();

    match err {
        SieError::PartialImport { partial, source } => {
            assert_eq!(partial.skapade_konton, 4);
            assert_eq!(partial.importerade_verifikationer, 1);
            assert_eq!(partial.importerade_balanser, 0);
            assert!(matches!(*source, SieError::Storage(_)));
        }
        other => panic!("expected partial import, got {other:?}"),
    }
    assert_eq!(storage.list_verifications().await.unwrap().len(), 1);

    // a retry picks up where the failed run stopped
    storage.fail_after(usize::MAX).unwrap();
    let retry = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &settings)
        .await
        .unwrap();
    assert_eq!(retry.antal_dubbletter, 1);
    assert_eq!(retry.importerade_verifikationer, 2);
    assert_eq!(storage.list_verifications().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_imports_into_same_organisation() {
    let storage = MemoryStorage::new();
    let locks = ImportLocks::new();
    let mut first = SieImporter::new(storage.clone()).with_locks(locks.clone());
    let mut second = SieImporter::new(storage.clone()).with_locks(locks);
    let settings = ImportSettings::default();

    let (a, b) = tokio::join!(
        first.import_bytes(SAMPLE.as_bytes(), "text/plain", &settings),
        second.import_bytes(SAMPLE.as_bytes(), "text/plain", &settings),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.importerade_verifikationer + b.importerade_verifikationer, 3);
    assert_eq!(a.antal_dubbletter + b.antal_dubbletter, 3);
    assert_eq!(a.skapade_konton + b.skapade_konton, 4);
    assert_eq!(storage.list_verifications().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_duplicate_cleanup_keeps_earliest_and_referenced() {
    let mut storage = MemoryStorage::new();
    let ver = Verifikation::new("A", "1", date(2024, 2, 1), "Hyra")
        .with_transaktion("5010", BigDecimal::from(8000))
        .with_transaktion("1930", BigDecimal::from(-8000));

    let original = storage.save_verification(&ver).await.unwrap();
    let referenced = storage.save_verification(&ver).await.unwrap();
    storage.save_verification(&ver).await.unwrap();
    storage.mark_referenced(referenced.id).unwrap();

    let mut importer = SieImporter::new(storage.clone());
    let report = importer.rensa_dubbletter().await.unwrap();

    assert_eq!(report.rensade, 1);
    assert_eq!(report.fel.len(), 1);

    let ids: Vec<_> = storage
        .list_verifications()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![original.id, referenced.id]);
}

#[tokio::test]
async fn test_export_round_trip() {
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone());
    importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &ImportSettings::default())
        .await
        .unwrap();

    let header = parse(SAMPLE).unwrap().data.header;
    let exported = export_ledger(&storage, header).await.unwrap();
    let config = ExportConfig::default();
    let bytes = SieGenerator::new(&config).generate_bytes(&exported);

    let reparsed = parse_bytes(&bytes).unwrap();
    assert!(reparsed.warnings.is_empty(), "{:?}", reparsed.warnings);

    let original = parse(SAMPLE).unwrap().data;
    assert_eq!(reparsed.data.verifikationer.len(), original.verifikationer.len());
    for ver in &original.verifikationer {
        let copy = reparsed
            .data
            .verifikationer
            .iter()
            .find(|v| v.key() == ver.key())
            .unwrap();
        assert_eq!(copy.datum, ver.datum);
        assert_eq!(copy.transaktioner, ver.transaktioner);
    }
    assert_eq!(reparsed.data.konto("3001").unwrap().namn, "Försäljning inom Sverige, 25 % moms");
    assert_eq!(reparsed.data.balanser.ingaende.len(), 1);
}

#[tokio::test]
async fn test_parse_warnings_are_reported() {
    let text = format!("{}#BOGUS 1\n", SAMPLE);
    let mut importer = SieImporter::new(MemoryStorage::new());

    let resultat = importer
        .import_bytes(text.as_bytes(), "text/plain", &ImportSettings::default())
        .await
        .unwrap();

    assert_eq!(resultat.importerade_verifikationer, 3);
    assert_eq!(resultat.fel.len(), 1);
    assert!(resultat.fel[0].contains("#BOGUS"));
}

#[tokio::test]
async fn test_rejected_uploads() {
    let mut importer = SieImporter::new(MemoryStorage::new());
    let settings = ImportSettings::default();

    assert!(matches!(
        importer.import_bytes(SAMPLE.as_bytes(), "image/png", &settings).await,
        Err(SieError::Validation(_))
    ));
    assert!(matches!(
        importer.import_bytes(b"", "text/plain", &settings).await,
        Err(SieError::Validation(_))
    ));
    assert!(matches!(
        importer.import_bytes(b"not a sie file", "text/plain", &settings).await,
        Err(SieError::Fatal(_))
    ));
}

#[tokio::test]
async fn test_enhanced_validator_rejects_fractional_ore() {
    let text = "#KONTO 1930 Bank\n#KONTO 3001 Försäljning\n\
                #VER A 1 20240110 \"Avrundning\"\n{\n#TRANS 1930 {} 0.125\n#TRANS 3001 {} -0.125\n}\n";
    let mut importer = SieImporter::new(MemoryStorage::new()).with_validators(
        Box::new(DefaultAccountValidator),
        Box::new(EnhancedVerificationValidator),
    );

    let resultat = importer
        .import_bytes(text.as_bytes(), "text/plain", &ImportSettings::default())
        .await
        .unwrap();
    assert_eq!(resultat.importerade_verifikationer, 0);
    assert_eq!(resultat.fel.len(), 1);
    assert!(resultat.fel[0].starts_with("Beloppet 0.125"), "{:?}", resultat.fel);
}

#[tokio::test]
async fn test_rejected_account_blocks_its_rows() {
    let text = format!(
        "#RAR 0 20240101 20241231\n#KONTO 1930 Bank\n#KONTO 3001 \"{}\"\n\
         #UB 0 3001 -1000\n#RES 0 3001 -1000\n\
         #VER A 1 20240110 \"Försäljning\"\n{{\n#TRANS 1930 {{}} 1000\n#TRANS 3001 {{}} -1000\n}}\n",
        "X".repeat(101)
    );
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone()).with_validators(
        Box::new(EnhancedAccountValidator),
        Box::new(EnhancedVerificationValidator),
    );

    let resultat = importer
        .import_bytes(text.as_bytes(), "text/plain", &ImportSettings::default())
        .await
        .unwrap();

    assert_eq!(resultat.skapade_konton, 1);
    assert_eq!(resultat.importerade_verifikationer, 0);
    assert_eq!(resultat.importerade_balanser, 0);
    assert_eq!(resultat.importerade_resultat, 0);
    assert!(resultat
        .fel
        .iter()
        .any(|f| f.starts_with("Konto 3001 skapades inte")));
    assert!(resultat.fel.iter().any(|f| f.contains("A1") && f.contains("3001")));

    let konton: Vec<_> = storage
        .list_accounts()
        .await
        .unwrap()
        .into_iter()
        .map(|k| k.nummer)
        .collect();
    assert_eq!(konton, vec!["1930"]);
    assert!(storage.list_verifications().await.unwrap().is_empty());
    assert!(storage.list_balances(BalansTyp::Utgaende).await.unwrap().is_empty());
    assert!(storage.list_results().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_result_serialization_shape() {
    let mut importer = SieImporter::new(MemoryStorage::new());
    let resultat = importer
        .import_bytes(SAMPLE.as_bytes(), "text/plain", &ImportSettings::default())
        .await
        .unwrap();

    let json = serde_json::to_value(&resultat).unwrap();
    assert_eq!(json["skapade_konton"], 4);
    assert_eq!(json["importerade_verifikationer"], 3);
    assert_eq!(json["antal_dubbletter"], 0);
    assert!(json["import_id"].is_string());
    assert!(json.get("fel").is_none());
}
