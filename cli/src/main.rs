fn main() {
    containerfs_cli::shared_main();
}
