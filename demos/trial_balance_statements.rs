use gaap_ifrs_converter::{
    default_sink, parse_ledger_csv, statements_to_markdown, write_statements_xlsx,
    StatementBuilder,
};

const TRIAL_BALANCE: &str = "\
Account Code,Account Name,Debit,Credit
1000,Cash,\"120,000.00\",0
2100,Trade Receivables,45000,0
3200,Equipment,80000,0
5000,Share Capital,0,150000
6100,Accounts Payable,0,30000
7000,Sales Revenue,0,90000
8100,Salaries,20000,0
8200,Rent Expense,5000,0
,Total,270000,270000
";

fn main() {
    let rows = parse_ledger_csv(TRIAL_BALANCE.as_bytes(), default_sink())
        .expect("trial balance should parse");
    let book = StatementBuilder::process(&rows, default_sink())
        .expect("statements should generate");

    println!("{}", statements_to_markdown(&book.statements));
    println!("Net income: {:.2}", book.statements.net_income());
    println!(
        "Net profit margin: {:.4}, current ratio: {:.4}",
        book.ratios.profitability.net_profit_margin, book.ratios.liquidity.current_ratio
    );

    println!("Strengths:");
    for s in &book.health.strengths {
        println!(" - {}", s);
    }
    println!("Weaknesses:");
    for w in &book.health.weaknesses {
        println!(" - {}", w);
    }

    let path = std::env::temp_dir().join("trial_balance_statements.xlsx");
    write_statements_xlsx(&book.statements, &path).expect("workbook should save");
    println!("Workbook written to {}", path.display());
}
