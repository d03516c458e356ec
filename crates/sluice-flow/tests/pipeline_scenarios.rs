//! End-to-end pipeline scenarios.

use std::sync::Arc;

use sluice_flow::prelude::*;

#[derive(Debug, Clone, PartialEq, Default)]
struct Product {
    id: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Pair {
    left: String,
    right: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Container<T> {
    value: T,
}

#[derive(Debug, Clone, PartialEq)]
struct Wrapper<T> {
    value: T,
}

/// String id -> Product, via a field-form slot.
#[derive(Default)]
struct LoadProduct {
    id: String,
    product: Product,
}

impl Factory for LoadProduct {
    type Output = Product;

    fn slots(&self) -> Vec<SlotSpec<Self>> {
        vec![SlotSpec::field(|f: &mut Self| &mut f.id)]
    }

    fn process(&mut self) -> Result<(), FactoryError> {
        self.product = Product {
            id: self.id.clone(),
        };
        Ok(())
    }

    fn get(&self) -> Product {
        self.product.clone()
    }
}

/// No inputs -> a literal Pair.
#[derive(Default)]
struct BuildPair;

impl Factory for BuildPair {
    type Output = Pair;

    fn process(&mut self) -> Result<(), FactoryError> {
        Ok(())
    }

    fn get(&self) -> Pair {
        Pair {
            left: "a".into(),
            right: "b".into(),
        }
    }
}

/// Product -> Container<Product>, via a field-form slot.
#[derive(Default)]
struct WrapProduct {
    product: Product,
}

impl Factory for WrapProduct {
    type Output = Container<Product>;

    fn slots(&self) -> Vec<SlotSpec<Self>> {
        vec![SlotSpec::field(|f: &mut Self| &mut f.product)]
    }

    fn process(&mut self) -> Result<(), FactoryError> {
        Ok(())
    }

    fn get(&self) -> Container<Product> {
        Container {
            value: self.product.clone(),
        }
    }
}

/// Pair -> Wrapper<Pair>, via a setter-form slot.
#[derive(Default)]
struct WrapPair {
    pair: Pair,
}

impl WrapPair {
    fn set_pair(&mut self, pair: Pair) {
        self.pair = pair;
    }
}

impl Factory for WrapPair {
    type Output = Wrapper<Pair>;

    fn slots(&self) -> Vec<SlotSpec<Self>> {
        vec![SlotSpec::setter(Self::set_pair)]
    }

    fn process(&mut self) -> Result<(), FactoryError> {
        Ok(())
    }

    fn get(&self) -> Wrapper<Pair> {
        Wrapper {
            value: self.pair.clone(),
        }
    }
}

#[test]
fn chained_pipeline_routes_every_delivery() {
    let mut pipeline = Pipeline::new();
    pipeline
        .set_input(String::from("id_of_product1"))
        .unwrap();
    pipeline
        .add_stage(
            Stage::new()
                .add_factory(LoadProduct::default())
                .unwrap()
                .add_factory(BuildPair)
                .unwrap(),
        )
        .unwrap();
    pipeline.add_stage_of::<WrapProduct>().unwrap();
    pipeline.add_stage_of::<WrapPair>().unwrap();

    let report = pipeline.run().unwrap();
    assert_eq!(report.state, RunState::Succeeded);

    // Seed + four factory outputs.
    assert!(pipeline.dispatcher().len().unwrap() >= 5);

    assert_eq!(
        *pipeline.get_output::<LoadProduct>().unwrap(),
        Product {
            id: "id_of_product1".into()
        }
    );
    assert_eq!(
        *pipeline.get_output::<BuildPair>().unwrap(),
        Pair {
            left: "a".into(),
            right: "b".into()
        }
    );
    assert_eq!(
        *pipeline.get_output::<WrapProduct>().unwrap(),
        Container {
            value: Product {
                id: "id_of_product1".into()
            }
        }
    );

    let wrapped = pipeline.get_deliverable::<Wrapper<Pair>>().unwrap();
    assert_eq!(
        *wrapped.get::<Wrapper<Pair>>().unwrap(),
        Wrapper {
            value: Pair {
                left: "a".into(),
                right: "b".into()
            }
        }
    );

    // The end stage's last factory drives get_last_output.
    assert_eq!(
        *pipeline.get_last_output::<Wrapper<Pair>>().unwrap(),
        Wrapper {
            value: Pair {
                left: "a".into(),
                right: "b".into()
            }
        }
    );
}

#[test]
fn consumer_scoped_seed_wins_over_generic_seed() {
    let mut pipeline = Pipeline::new();
    pipeline.set_input(String::from("wrong")).unwrap();
    pipeline
        .set_input_for::<LoadProduct, _>(String::from("id_of_product1"))
        .unwrap();
    pipeline.add_stage_of::<LoadProduct>().unwrap();

    pipeline.run().unwrap();

    assert_eq!(
        pipeline.get_output::<LoadProduct>().unwrap().id,
        "id_of_product1"
    );
}

#[test]
fn external_delivery_survives_the_run() {
    let mut pipeline = Pipeline::new();
    pipeline
        .set_input(String::from("id_of_product1"))
        .unwrap();
    pipeline.add_stage_of::<LoadProduct>().unwrap();
    pipeline.run().unwrap();

    let strings = pipeline.deliveries_of::<String>().unwrap();
    assert_eq!(strings.len(), 1);
    assert!(strings[0].producer().is_external());
    assert_eq!(*strings[0].get::<String>().unwrap(), "id_of_product1");
}

#[test]
fn describe_renders_nodes_and_edges() {
    let mut pipeline = Pipeline::new();
    pipeline
        .set_input(String::from("id_of_product1"))
        .unwrap();
    pipeline.add_stage_of::<LoadProduct>().unwrap();
    pipeline.add_stage_of::<WrapProduct>().unwrap();

    let rendered = pipeline.describe().unwrap();
    assert!(rendered.contains("node n0 stage=0 factory=LoadProduct output=Product"));
    assert!(rendered.contains("node n1 stage=1 factory=WrapProduct"));
    assert!(rendered.contains("edge external -> n0 slot=0 type=String"));
    assert!(rendered.contains("edge n0 -> n1 slot=0 type=Product"));
}

/// Two independent producers plus one consumer: the optimizer may merge the
/// independent stages but must keep the consumer after its producer, and
/// the outputs must be identical either way.
#[derive(Default)]
struct MakeNumber;

impl Factory for MakeNumber {
    type Output = u32;

    fn process(&mut self) -> Result<(), FactoryError> {
        Ok(())
    }

    fn get(&self) -> u32 {
        41
    }
}

#[derive(Default)]
struct MakeLabel;

impl Factory for MakeLabel {
    type Output = String;

    fn process(&mut self) -> Result<(), FactoryError> {
        Ok(())
    }

    fn get(&self) -> String {
        "label".into()
    }
}

#[derive(Default)]
struct Increment {
    input: u32,
}

impl Factory for Increment {
    type Output = u32;

    fn slots(&self) -> Vec<SlotSpec<Self>> {
        vec![SlotSpec::field(|f: &mut Self| &mut f.input).from_producer::<MakeNumber>()]
    }

    fn process(&mut self) -> Result<(), FactoryError> {
        self.input += 1;
        Ok(())
    }

    fn get(&self) -> u32 {
        self.input
    }
}

fn three_stage_pipeline(config: PipelineConfig) -> Pipeline {
    let mut pipeline = Pipeline::with_config(config);
    pipeline.add_stage_of::<MakeNumber>().unwrap();
    pipeline.add_stage_of::<MakeLabel>().unwrap();
    pipeline.add_stage_of::<Increment>().unwrap();
    pipeline
}

#[test]
fn optimizer_preserves_final_outputs() {
    let mut plain = three_stage_pipeline(PipelineConfig::default());
    plain.run().unwrap();

    let mut optimized = three_stage_pipeline(PipelineConfig {
        optimize: true,
        ..PipelineConfig::default()
    });
    optimized.run().unwrap();

    assert_eq!(
        *plain.get_output::<Increment>().unwrap(),
        *optimized.get_output::<Increment>().unwrap()
    );
    assert_eq!(*optimized.get_output::<Increment>().unwrap(), 42);
    assert_eq!(
        *plain.get_output::<MakeLabel>().unwrap(),
        *optimized.get_output::<MakeLabel>().unwrap()
    );
}

#[test]
fn optimizer_merges_independent_stages_only() {
    let mut pipeline = three_stage_pipeline(PipelineConfig {
        optimize: true,
        ..PipelineConfig::default()
    });
    pipeline.run().unwrap();

    let plan = pipeline.inspect().unwrap();
    // The label builder merged beside the number builder; the incrementer
    // still runs strictly after its producer.
    assert_eq!(plan.stage_count(), 2);
    let increment_node = plan
        .nodes()
        .iter()
        .find(|node| node.descriptor.class == FactoryClass::of::<Increment>())
        .unwrap();
    assert_eq!(increment_node.stage_id, 1);
}

#[test]
fn optimizer_keeps_the_end_marker_on_the_last_registered_factory() {
    // The dependency-free label builder is registered LAST, so it carries
    // the end marker — while compaction pulls it forward into the first
    // stage and leaves the incrementer in the new final stage.
    fn build(config: PipelineConfig) -> Pipeline {
        let mut pipeline = Pipeline::with_config(config);
        pipeline.add_stage_of::<MakeNumber>().unwrap();
        pipeline.add_stage_of::<Increment>().unwrap();
        pipeline.add_stage_of::<MakeLabel>().unwrap();
        pipeline
    }

    let mut plain = build(PipelineConfig::default());
    plain.run().unwrap();

    let mut optimized = build(PipelineConfig {
        optimize: true,
        ..PipelineConfig::default()
    });
    optimized.run().unwrap();

    // The stage list really was rewritten...
    let plan = optimized.inspect().unwrap();
    assert_eq!(plan.stage_count(), 2);

    // ...but the last output is the label builder's either way, not the
    // incrementer's just because it occupies the deepest stage.
    assert_eq!(*plain.get_last_output::<String>().unwrap(), "label");
    assert_eq!(*optimized.get_last_output::<String>().unwrap(), "label");
    assert_eq!(*optimized.get_output::<Increment>().unwrap(), 42);
}

#[test]
fn parallel_stage_produces_all_outputs() {
    let mut pipeline = Pipeline::with_config(PipelineConfig {
        parallel_workers: Some(2),
        ..PipelineConfig::default()
    });
    pipeline
        .add_stage(
            Stage::new()
                .add_factory(MakeNumber)
                .unwrap()
                .add_factory(MakeLabel)
                .unwrap()
                .parallel(true),
        )
        .unwrap();
    pipeline.add_stage_of::<Increment>().unwrap();

    pipeline.run().unwrap();
    assert_eq!(*pipeline.get_output::<MakeNumber>().unwrap(), 41);
    assert_eq!(*pipeline.get_output::<MakeLabel>().unwrap(), "label");
    assert_eq!(*pipeline.get_output::<Increment>().unwrap(), 42);
}

#[test]
fn rerun_keeps_both_generations_of_outputs() {
    let mut pipeline = Pipeline::new();
    pipeline
        .set_input(String::from("id_of_product1"))
        .unwrap();
    pipeline.add_stage_of::<LoadProduct>().unwrap();

    pipeline.run().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
    pipeline.run().unwrap();

    // Older outputs are never overwritten; both generations stay queryable.
    let products = pipeline.deliveries_of::<Product>().unwrap();
    assert_eq!(products.len(), 2);
}

#[test]
fn benchmark_rows_name_stage_and_factory() {
    let mut pipeline = Pipeline::with_config(PipelineConfig {
        benchmark: true,
        ..PipelineConfig::default()
    });
    pipeline
        .set_input(String::from("id_of_product1"))
        .unwrap();
    pipeline.add_stage_of::<LoadProduct>().unwrap();
    pipeline.add_stage_of::<WrapProduct>().unwrap();

    let report = pipeline.run().unwrap();
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].factory, "LoadProduct");
    assert_eq!(report.rows[1].stage_id, 1);
    assert!(report.duration().is_some());
}

#[test]
fn prebuilt_envelope_round_trips_through_the_registry() {
    let delivery = Delivery::new(String::from("id_of_product1"));
    let payload: Arc<String> = delivery.get::<String>().unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.set_input_delivery(delivery).unwrap();
    pipeline.add_stage_of::<LoadProduct>().unwrap();
    pipeline.run().unwrap();

    let held = pipeline.get_deliverable::<String>().unwrap();
    assert!(Arc::ptr_eq(&payload, &held.get::<String>().unwrap()));
}
