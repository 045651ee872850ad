fn main() -> Result<(), Box<dyn std::error::Error>> {
    chatbot_relay::cli::main()
}
