fn main() -> anyhow::Result<()> {
    dompick::cli::run()
}
