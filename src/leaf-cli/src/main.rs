use std::error::Error;
use std::fs;
use std::path::PathBuf;

use structopt::StructOpt;

use leaf_detect::aws::{load_sdk_config, DynamoDbRecords, RekognitionLabels, SageMakerEndpoint};
use leaf_detect::{populate, wire, InboundRequest, Orchestrator};

use log::info;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "leaf-cli",
    about = "Operator tools for the leaf disease detection service"
)]
enum Command {
    /// Load disease documents into the record table
    Populate {
        #[structopt(long, env = "DYNAMODB_TABLE_NAME", help = "Name of the disease table")]
        table: String,

        #[structopt(long, help = "Print the items instead of writing them")]
        dry_run: bool,

        #[structopt(parse(from_os_str), help = "Directory of JSON disease documents")]
        data_dir: PathBuf,
    },

    /// Run the full request pipeline on a local image
    Classify {
        #[structopt(long, env = "DYNAMODB_TABLE_NAME", help = "Name of the disease table")]
        table: String,

        #[structopt(long, env = "SAGEMAKER_INFERENCE_ENDPOINT", help = "Inference endpoint name")]
        endpoint: String,

        #[structopt(parse(from_os_str), help = "Image file to classify")]
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match Command::from_args() {
        Command::Populate {
            table,
            dry_run: true,
            data_dir,
        } => {
            info!("Dry run for table {}", table);
            for (path, item) in populate::load_items(&data_dir)? {
                println!("{}: {}", path.display(), wire::item_to_json(&item));
            }
        }
        Command::Populate {
            table, data_dir, ..
        } => {
            let sdk_config = load_sdk_config().await;
            let store = DynamoDbRecords::new(&sdk_config, &table);

            let count = populate::populate(&store, &data_dir).await?;
            info!("Wrote {} records to {}", count, store.table());
        }
        Command::Classify {
            table,
            endpoint,
            image,
        } => {
            let bytes = fs::read(&image)?;

            let sdk_config = load_sdk_config().await;
            let orchestrator = Orchestrator::new(
                RekognitionLabels::new(&sdk_config),
                SageMakerEndpoint::new(&sdk_config, &endpoint),
                DynamoDbRecords::new(&sdk_config, &table),
            );

            let request = InboundRequest::new(base64::encode(&bytes));
            let reply = orchestrator.handle(&request).await?;

            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}
