//! Import a SIE file into an in-memory ledger and export it again
//!
//! Usage: cargo run --example import_sie -- [path/to/file.se] [config.yaml]

use sie_core::utils::MemoryStorage;
use sie_core::{
    export_ledger, init_tracing, parse_bytes, validate, ImportSettings, SieConfig, SieError,
    SieGenerator, SieImporter,
};

const DEMO_FILE: &str = r#"#FLAGGA 0
#PROGRAM "Demo" 1.0
#FORMAT PC8
#SIETYP 4
#ORGNR 556677-8899
#FNAMN "Exempelbolaget AB"
#RAR 0 20240101 20241231
#KONTO 1930 "Företagskonto"
#KONTO 3001 "Försäljning inom Sverige, 25 % moms"
#KONTO 2611 "Utgående moms 25 %"
#IB 0 1930 25000.00
#VER A 1 20240115 "Kontantförsäljning"
{
   #TRANS 1930 {} 1250.00
   #TRANS 3001 {} -1000.00
   #TRANS 2611 {} -250.00
}
#VER A 2 20240116 "Felaktig verifikation"
{
   #TRANS 1930 {} 100.00
   #TRANS 3001 {} -90.00
}
#VER A 3 20240120 "Okänt konto"
{
   #TRANS 1930 {} 500.00
   #TRANS 3041 {} -500.00
}
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let bytes = match args.next() {
        Some(path) => std::fs::read(path)?,
        None => DEMO_FILE.as_bytes().to_vec(),
    };
    let config = match args.next() {
        Some(path) => SieConfig::load(path)?,
        None => SieConfig::default(),
    };
    init_tracing(&config.logging.level);

    println!("📄 SIE Core - Import Example\n");

    // 1. Parse and check the file before touching the ledger
    let outcome = parse_bytes(&bytes)?;
    println!(
        "Parsed {} accounts and {} verifications ({} warnings)",
        outcome.data.konton.len(),
        outcome.data.verifikationer.len(),
        outcome.warnings.len()
    );
    for issue in validate(&outcome.data) {
        println!("  ⚠ {}", issue);
    }
    println!();

    // 2. Import, letting the importer create accounts the file only references
    let storage = MemoryStorage::new();
    let mut importer = SieImporter::new(storage.clone()).with_config(config.clone());
    let settings = ImportSettings {
        skapa_konton: true,
        ..Default::default()
    };

    match importer.import_bytes(&bytes, "text/plain", &settings).await {
        Ok(resultat) => {
            println!("Import {}", resultat.import_id);
            println!("  ✓ Accounts created:      {}", resultat.skapade_konton);
            println!("  ✓ Verifications:         {}", resultat.importerade_verifikationer);
            println!("  ✓ Balances:              {}", resultat.importerade_balanser);
            println!("  ✓ Results:               {}", resultat.importerade_resultat);
            println!("  ✓ Duplicates skipped:    {}", resultat.antal_dubbletter);
            for fel in &resultat.fel {
                println!("  ✗ {}", fel);
            }
        }
        Err(SieError::PartialImport { partial, source }) => {
            println!("Import stopped: {}", source);
            println!(
                "  {} verifications were written before the failure",
                partial.importerade_verifikationer
            );
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }
    println!();

    // 3. Running the same file again only finds duplicates
    let again = importer.import_bytes(&bytes, "text/plain", &settings).await?;
    println!(
        "Second import: {} new, {} duplicates\n",
        again.importerade_verifikationer, again.antal_dubbletter
    );

    // 4. Export the ledger back to SIE
    let exported = export_ledger(&storage, outcome.data.header.clone()).await?;
    let text = SieGenerator::new(&config.export).generate(&exported);
    println!("Exported SIE:\n{}", text);

    Ok(())
}
