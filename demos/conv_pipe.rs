use lamina_nn::{ExecutionContext, LayerSpec, Tensor, Topology, DEFAULT_EVAL_BUDGET};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = ExecutionContext::with_seed(7);

    // A small convolutional stack with a two-branch pipe in the middle.
    let mut net = Topology::new();
    net.add(
        &mut ctx,
        &LayerSpec::new("conv_relu")
            .with_input_map(1, 8, 8)
            .with_kernel(3, 3)
            .with_filters(4),
    )?;
    net.add(&mut ctx, &LayerSpec::new("max_pool").with_kernel(2, 2))?;
    net.add(&mut ctx, &LayerSpec::pipe(2))?;
    net.add_pipe_layer(&mut ctx, 0, &LayerSpec::new("conv_relu").with_kernel(1, 1).with_filters(2))?;
    net.add_pipe_layer(&mut ctx, 1, &LayerSpec::new("conv_tanh").with_kernel(3, 3).with_filters(6))?;
    net.add(&mut ctx, &LayerSpec::new("sigmoid").with_output(10))?;
    net.add(&mut ctx, &LayerSpec::new("cross_entropy"))?;

    println!("{}", net.describe());

    let input = Tensor::zeros(&[2, 8, 8, 1]);
    let output = net.predict(&ctx, &input, DEFAULT_EVAL_BUDGET)?;
    println!("prediction shape: {:?}", output.shape);
    println!("classes: {:?}", net.predict_classes(&ctx, &input, DEFAULT_EVAL_BUDGET)?);
    Ok(())
}
