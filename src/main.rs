fn main() -> anyhow::Result<()> {
    somnicue_lib::run()
}
